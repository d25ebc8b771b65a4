//! Base-26 lexicographic rank keys.
//!
//! # Responsibility
//! - Define the validated `Rank` key type.
//! - Compute a key strictly between two bounds (`RankSpace::rank_between`).
//! - Compute evenly spaced keys for a whole list (`RankSpace::rebalance`).
//!
//! # Invariants
//! - Alphabet is `a..=z`; keys are never interpreted as numbers.
//! - Generated keys never end with `a`, so a gap always remains below them.
//! - Keys longer than the configured threshold are never returned;
//!   `RankError::NeedsRebalance` is signalled instead.
//! - `rebalance` preserves the relative order of its input.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Digit alphabet, lowest first.
pub const ALPHABET: &[u8; 26] = b"abcdefghijklmnopqrstuvwxyz";
/// Canonical key for the first item of an empty list.
pub const INITIAL_RANK: &str = "n";
/// Default key length threshold before a rebalance is required.
pub const DEFAULT_MAX_RANK_LENGTH: usize = 10;

const BASE: u32 = ALPHABET.len() as u32;
/// Minimum distance between two rebalanced neighbors, in finest-digit units.
const REBALANCE_MIN_GAP: u128 = BASE as u128;

static RANK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z]+$").expect("valid rank regex"));

pub type RankResult<T> = Result<T, RankError>;

/// Errors from rank parsing and computation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RankError {
    /// Key is empty or contains characters outside `a..=z`.
    InvalidRank(String),
    /// Lower bound does not sort before upper bound.
    InvalidOrder { lower: Rank, upper: Rank },
    /// No key within the length threshold fits between the bounds.
    NeedsRebalance {
        lower: Option<Rank>,
        upper: Option<Rank>,
    },
    /// Even spacing cannot be produced for this many items.
    RebalanceFailure {
        item_count: usize,
        max_rank_length: usize,
    },
}

impl Display for RankError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidRank(value) => write!(f, "invalid rank `{value}`; expected [a-z]+"),
            Self::InvalidOrder { lower, upper } => {
                write!(f, "invalid rank order: `{lower}` must sort before `{upper}`")
            }
            Self::NeedsRebalance { lower, upper } => write!(
                f,
                "no rank fits between {} and {}; list needs rebalancing",
                describe_bound(lower.as_ref(), "start"),
                describe_bound(upper.as_ref(), "end")
            ),
            Self::RebalanceFailure {
                item_count,
                max_rank_length,
            } => write!(
                f,
                "cannot rebalance {item_count} items within rank length {max_rank_length}"
            ),
        }
    }
}

impl Error for RankError {}

fn describe_bound(rank: Option<&Rank>, open_end: &str) -> String {
    match rank {
        Some(rank) => format!("`{rank}`"),
        None => open_end.to_string(),
    }
}

/// Lexicographically sortable position key.
///
/// Ordering is the derived `String` ordering, i.e. byte-wise.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rank(String);

impl Rank {
    /// Parses and validates a key.
    pub fn parse(value: impl Into<String>) -> RankResult<Self> {
        let value = value.into();
        if !RANK_RE.is_match(&value) {
            return Err(RankError::InvalidRank(value));
        }
        Ok(Self(value))
    }

    /// Returns the canonical first key.
    pub fn initial() -> Self {
        Self(INITIAL_RANK.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn digits(&self) -> Vec<u8> {
        self.0.bytes().map(|byte| byte - ALPHABET[0]).collect()
    }

    fn from_digits(digits: &[u8]) -> Self {
        Self(
            digits
                .iter()
                .map(|digit| char::from(ALPHABET[usize::from(*digit)]))
                .collect(),
        )
    }
}

impl Display for Rank {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Rank {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Rank {
    type Error = RankError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl TryFrom<&str> for Rank {
    type Error = RankError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Rank> for String {
    fn from(value: Rank) -> Self {
        value.0
    }
}

/// Anything that carries a rank and can be rebalanced in place.
pub trait Ranked {
    fn rank(&self) -> &Rank;
    fn set_rank(&mut self, rank: Rank);
}

/// Rank computation policy for one deployment.
///
/// Each list owns an independent rank space; nothing here is shared
/// across lists or cached between calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankSpace {
    max_rank_length: usize,
}

impl Default for RankSpace {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RANK_LENGTH)
    }
}

impl RankSpace {
    pub fn new(max_rank_length: usize) -> Self {
        Self { max_rank_length }
    }

    pub fn max_rank_length(&self) -> usize {
        self.max_rank_length
    }

    /// Key for the first item in an empty list.
    pub fn initial_rank(&self) -> Rank {
        Rank::initial()
    }

    /// Returns a key strictly between `lower` and `upper`.
    ///
    /// `None` bounds are open ends: `(None, Some(u))` inserts at the start,
    /// `(Some(l), None)` appends, `(None, None)` yields `INITIAL_RANK`.
    ///
    /// # Errors
    /// - `InvalidOrder` when both bounds are present and `lower >= upper`.
    /// - `NeedsRebalance` when no key within the length threshold exists
    ///   between the bounds.
    pub fn rank_between(&self, lower: Option<&Rank>, upper: Option<&Rank>) -> RankResult<Rank> {
        if let (Some(lower), Some(upper)) = (lower, upper) {
            if lower >= upper {
                return Err(RankError::InvalidOrder {
                    lower: lower.clone(),
                    upper: upper.clone(),
                });
            }
        }

        let lower_digits = lower.map(Rank::digits).unwrap_or_default();
        let upper_digits = upper.map(Rank::digits);
        let needs_rebalance = || RankError::NeedsRebalance {
            lower: lower.cloned(),
            upper: upper.cloned(),
        };

        let digits = midpoint(&lower_digits, upper_digits.as_deref()).ok_or_else(needs_rebalance)?;
        if digits.len() > self.max_rank_length {
            return Err(needs_rebalance());
        }
        Ok(Rank::from_digits(&digits))
    }

    /// Whether a stored key is already over the length threshold.
    pub fn needs_rebalancing(&self, rank: &Rank) -> bool {
        rank.len() > self.max_rank_length
    }

    /// Returns `count` strictly increasing keys spread evenly over the space.
    ///
    /// Keys use the smallest width `w` for which `26^w` leaves a gap of at
    /// least one full digit between neighbors, so every gap (and both open
    /// ends) accepts a `rank_between` of length at most `w + 1`.
    pub fn balanced_ranks(&self, count: usize) -> RankResult<Vec<Rank>> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let failure = RankError::RebalanceFailure {
            item_count: count,
            max_rank_length: self.max_rank_length,
        };
        let slots = count as u128 + 1;
        let required = slots.checked_mul(REBALANCE_MIN_GAP).ok_or(failure.clone())?;

        let mut width = 1usize;
        let mut space = u128::from(BASE);
        while space < required {
            width += 1;
            if width + 1 > self.max_rank_length {
                return Err(failure);
            }
            space = space.checked_mul(u128::from(BASE)).ok_or(failure.clone())?;
        }
        if width + 1 > self.max_rank_length {
            return Err(failure);
        }

        let step = space / slots;
        Ok((1..=count as u128)
            .map(|index| Rank::from_digits(&encode_fixed_width(index * step, width)))
            .collect())
    }

    /// Assigns evenly spaced keys to `items`, keeping their current order.
    pub fn rebalance<T: Ranked>(&self, items: &mut [T]) -> RankResult<()> {
        let ranks = self.balanced_ranks(items.len())?;
        for (item, rank) in items.iter_mut().zip(ranks) {
            item.set_rank(rank);
        }
        Ok(())
    }
}

/// Indexes of `after` in an order that persists them one row at a time
/// without any write reusing a key another item still holds.
///
/// `before` and `after` are the old and new keys of the same items, both
/// strictly increasing. Items whose key did not change are skipped.
/// Keys moving down are written first in ascending order, then keys
/// moving up in descending order.
pub fn rewrite_order(before: &[Rank], after: &[Rank]) -> Vec<usize> {
    let pairs = before.iter().zip(after).enumerate();
    let down = pairs
        .clone()
        .filter(|(_, (old, new))| new < old)
        .map(|(index, _)| index);
    let up: Vec<usize> = pairs
        .filter(|(_, (old, new))| new > old)
        .map(|(index, _)| index)
        .collect();
    down.chain(up.into_iter().rev()).collect()
}

/// Whether `ranks` is strictly increasing.
pub fn validate_rank_order(ranks: &[Rank]) -> bool {
    ranks.windows(2).all(|pair| pair[0] < pair[1])
}

/// Digit-level midpoint between `lower` (missing digits read as `a`) and
/// `upper` (`None` reads as one past the last digit).
///
/// Returns `None` when `upper` equals `lower` padded with lowest digits,
/// i.e. no string sorts strictly between them.
fn midpoint(lower: &[u8], upper: Option<&[u8]>) -> Option<Vec<u8>> {
    let mut result = Vec::new();
    let mut lower = lower;
    let mut upper = upper;

    loop {
        if let Some(bound) = upper {
            let shared = bound
                .iter()
                .enumerate()
                .take_while(|(index, digit)| lower.get(*index).copied().unwrap_or(0) == **digit)
                .count();
            if shared == bound.len() {
                return None;
            }
            result.extend_from_slice(&bound[..shared]);
            lower = lower.get(shared..).unwrap_or(&[]);
            upper = Some(&bound[shared..]);
        }

        let low = u32::from(lower.first().copied().unwrap_or(0));
        let high = upper.map_or(BASE, |bound| u32::from(bound[0]));

        if high - low > 1 {
            result.push(((low + high) / 2) as u8);
            return Some(result);
        }

        // Adjacent digits: a longer upper can be cut right after its first
        // digit; otherwise keep the lower digit and open the upper end.
        if let Some(bound) = upper {
            if bound.len() > 1 {
                result.push(bound[0]);
                return Some(result);
            }
        }
        result.push(low as u8);
        lower = lower.get(1..).unwrap_or(&[]);
        upper = None;
    }
}

fn encode_fixed_width(mut value: u128, width: usize) -> Vec<u8> {
    let mut digits = vec![0u8; width];
    for slot in digits.iter_mut().rev() {
        *slot = (value % u128::from(BASE)) as u8;
        value /= u128::from(BASE);
    }
    while digits.last() == Some(&0) {
        digits.pop();
    }
    digits
}
