//! Optimistic-concurrency move protocol for one card.
//!
//! # Responsibility
//! - Run lock -> version check -> neighbor validation -> rank compute ->
//!   apply for a single move, against a caller-owned transaction.
//! - Rebalance the target list when the insertion seam is exhausted.
//! - Compute append ranks for the card creation path.
//!
//! # Invariants
//! - A version mismatch returns `Conflict` before anything is written.
//! - Neighbors are re-read under the lock; caller-supplied adjacency is
//!   never trusted.
//! - A successful move increments `version` by exactly one; rebalancing
//!   touches only ranks of other cards.
//! - Conflicts are never retried or merged here.

use crate::model::board::ListId;
use crate::model::card::{Card, CardId};
use crate::rank::lexorank::{rewrite_order, Rank, RankError, RankSpace};
use crate::repo::card_repo::CardRepository;
use crate::repo::RepoError;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type MoveResult<T> = Result<T, MoveError>;

/// One move request as issued by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRequest {
    pub card_uuid: CardId,
    pub target_list_uuid: ListId,
    /// Card that should end up immediately before the moved card.
    /// `None` means "start of list".
    pub before_card_uuid: Option<CardId>,
    /// Card that should end up immediately after the moved card.
    /// `None` means "end of list".
    pub after_card_uuid: Option<CardId>,
    /// Version the client last observed.
    pub expected_version: i64,
}

/// Why a move was rejected without touching storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InvalidMoveReason {
    /// Card does not exist or is soft-deleted.
    UnknownCard { card_uuid: CardId },
    /// Target list (or its board) does not exist or is soft-deleted.
    UnknownList { list_uuid: ListId },
    /// The moved card was named as its own neighbor.
    SelfNeighbor { card_uuid: CardId },
    /// Neighbor does not exist or is soft-deleted.
    UnknownNeighbor { card_uuid: CardId },
    /// Neighbor is live but belongs to another list.
    NeighborInOtherList {
        card_uuid: CardId,
        list_uuid: ListId,
    },
    /// Neighbors are not adjacent in the current order of the target list.
    NotAdjacent {
        before_card_uuid: Option<CardId>,
        after_card_uuid: Option<CardId>,
    },
}

impl Display for InvalidMoveReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownCard { card_uuid } => write!(f, "card not found: {card_uuid}"),
            Self::UnknownList { list_uuid } => write!(f, "target list not found: {list_uuid}"),
            Self::SelfNeighbor { card_uuid } => {
                write!(f, "card {card_uuid} cannot be its own neighbor")
            }
            Self::UnknownNeighbor { card_uuid } => {
                write!(f, "neighbor card not found: {card_uuid}")
            }
            Self::NeighborInOtherList {
                card_uuid,
                list_uuid,
            } => write!(f, "neighbor card {card_uuid} belongs to list {list_uuid}"),
            Self::NotAdjacent {
                before_card_uuid,
                after_card_uuid,
            } => write!(
                f,
                "neighbors are not adjacent: before={} after={}",
                describe_neighbor(before_card_uuid, "start"),
                describe_neighbor(after_card_uuid, "end")
            ),
        }
    }
}

fn describe_neighbor(card_uuid: &Option<CardId>, open_end: &str) -> String {
    card_uuid.map_or_else(|| open_end.to_string(), |id| id.to_string())
}

/// Terminal result of a move that reached a decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MoveOutcome {
    /// Move applied; carries the authoritative row.
    Success { card: Card },
    /// Caller's version is stale; nothing was written.
    Conflict { current_version: i64 },
    /// Request is inconsistent with current state; nothing was written.
    InvalidRequest { reason: InvalidMoveReason },
}

impl MoveOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    fn invalid(reason: InvalidMoveReason) -> Self {
        Self::InvalidRequest { reason }
    }
}

/// Failures that are not move decisions.
#[derive(Debug)]
pub enum MoveError {
    /// Storage failure, propagated unchanged.
    Repo(RepoError),
    /// Rank invariant violation (`RebalanceFailure`) or corrupt bounds.
    Rank(RankError),
}

impl Display for MoveError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Repo(err) => write!(f, "{err}"),
            Self::Rank(err) => write!(f, "{err}"),
        }
    }
}

impl Error for MoveError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::Rank(err) => Some(err),
        }
    }
}

impl From<RepoError> for MoveError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

impl From<RankError> for MoveError {
    fn from(value: RankError) -> Self {
        Self::Rank(value)
    }
}

/// Coordinates moves against one transaction-scoped repository.
pub struct MoveCoordinator<R: CardRepository> {
    repo: R,
    rank_space: RankSpace,
}

impl<R: CardRepository> MoveCoordinator<R> {
    pub fn new(repo: R, rank_space: RankSpace) -> Self {
        Self { repo, rank_space }
    }

    /// Repository the coordinator runs against.
    pub fn repo(&self) -> &R {
        &self.repo
    }

    /// Applies one move if the caller's view of the card is current.
    ///
    /// The caller must have begun a transaction on the repository and
    /// must commit only on `MoveOutcome::Success`.
    pub fn move_card(&self, request: &MoveRequest) -> MoveResult<MoveOutcome> {
        let Some(mut card) = self.repo.lock_card_for_update(request.card_uuid)? else {
            return Ok(MoveOutcome::invalid(InvalidMoveReason::UnknownCard {
                card_uuid: request.card_uuid,
            }));
        };

        if card.version != request.expected_version {
            return Ok(MoveOutcome::Conflict {
                current_version: card.version,
            });
        }

        if !self.repo.list_is_live(request.target_list_uuid)? {
            return Ok(MoveOutcome::invalid(InvalidMoveReason::UnknownList {
                list_uuid: request.target_list_uuid,
            }));
        }

        let siblings = self.siblings(request.target_list_uuid, request.card_uuid)?;
        if let Err(reason) = self.check_neighbors(&siblings, request)? {
            return Ok(MoveOutcome::invalid(reason));
        }

        let lower = rank_of(&siblings, request.before_card_uuid);
        let upper = rank_of(&siblings, request.after_card_uuid);
        let rank = match self.rank_space.rank_between(lower, upper) {
            Ok(rank) => rank,
            Err(RankError::NeedsRebalance { .. }) => {
                self.rebalance_list(request.target_list_uuid)?;
                let refreshed = self.siblings(request.target_list_uuid, request.card_uuid)?;
                self.rank_after_rebalance(
                    rank_of(&refreshed, request.before_card_uuid),
                    rank_of(&refreshed, request.after_card_uuid),
                    refreshed.len() + 1,
                )?
            }
            Err(other) => return Err(other.into()),
        };

        card.list_uuid = request.target_list_uuid;
        card.rank = rank;
        card.version += 1;
        self.repo.write_card(&card)?;

        let card = self
            .repo
            .get_card(card.card_uuid, false)?
            .ok_or(RepoError::CardNotFound(card.card_uuid))?;
        Ok(MoveOutcome::Success { card })
    }

    /// Rank for appending a new card at the end of `list_uuid`.
    pub fn create_initial_rank(&self, list_uuid: ListId) -> MoveResult<Rank> {
        let last = self.repo.last_live_rank(list_uuid)?;
        match self.rank_space.rank_between(last.as_ref(), None) {
            Ok(rank) => Ok(rank),
            Err(RankError::NeedsRebalance { .. }) => {
                let cards = self.rebalance_list(list_uuid)?;
                let last = cards.last().map(|card| &card.rank);
                self.rank_after_rebalance(last, None, cards.len() + 1)
            }
            Err(other) => Err(other.into()),
        }
    }

    /// Rank for inserting right after `after_card_uuid` in `list_uuid`.
    ///
    /// Returns `Ok(None)` when that card is not a live card of the list.
    pub fn rank_after_card(
        &self,
        list_uuid: ListId,
        after_card_uuid: CardId,
    ) -> MoveResult<Option<Rank>> {
        let cards = self.repo.live_cards_in_list(list_uuid)?;
        let Some(index) = cards.iter().position(|card| card.card_uuid == after_card_uuid) else {
            return Ok(None);
        };
        let lower = Some(&cards[index].rank);
        let upper = cards.get(index + 1).map(|card| &card.rank);

        match self.rank_space.rank_between(lower, upper) {
            Ok(rank) => Ok(Some(rank)),
            Err(RankError::NeedsRebalance { .. }) => {
                let cards = self.rebalance_list(list_uuid)?;
                let lower = cards.get(index).map(|card| &card.rank);
                let upper = cards.get(index + 1).map(|card| &card.rank);
                self.rank_after_rebalance(lower, upper, cards.len() + 1)
                    .map(Some)
            }
            Err(other) => Err(other.into()),
        }
    }

    /// Reassigns evenly spaced ranks to every live card of one list.
    ///
    /// Must run in the same transaction as the operation that needs it.
    /// Versions are left untouched.
    pub fn rebalance_list(&self, list_uuid: ListId) -> MoveResult<Vec<Card>> {
        let mut cards = self.repo.live_cards_in_list(list_uuid)?;
        let before: Vec<Rank> = cards.iter().map(|card| card.rank.clone()).collect();
        self.rank_space.rebalance(&mut cards)?;
        let after: Vec<Rank> = cards.iter().map(|card| card.rank.clone()).collect();
        // Live ranks are unique per list, so no write may take a key
        // another card still holds.
        for index in rewrite_order(&before, &after) {
            self.repo.write_card(&cards[index])?;
        }
        info!(
            "event=list_rebalance module=service status=ok list_uuid={list_uuid} card_count={}",
            cards.len()
        );
        Ok(cards)
    }

    fn siblings(&self, list_uuid: ListId, moving: CardId) -> MoveResult<Vec<Card>> {
        let mut cards = self.repo.live_cards_in_list(list_uuid)?;
        cards.retain(|card| card.card_uuid != moving);
        Ok(cards)
    }

    fn rank_after_rebalance(
        &self,
        lower: Option<&Rank>,
        upper: Option<&Rank>,
        item_count: usize,
    ) -> MoveResult<Rank> {
        self.rank_space
            .rank_between(lower, upper)
            .map_err(|err| match err {
                RankError::NeedsRebalance { .. } => RankError::RebalanceFailure {
                    item_count,
                    max_rank_length: self.rank_space.max_rank_length(),
                },
                other => other,
            })
            .map_err(Into::into)
    }

    /// Validates neighbor ids against the locked, current list order.
    fn check_neighbors(
        &self,
        siblings: &[Card],
        request: &MoveRequest,
    ) -> MoveResult<Result<(), InvalidMoveReason>> {
        let before = match self.locate_neighbor(siblings, request, request.before_card_uuid)? {
            Ok(index) => index,
            Err(reason) => return Ok(Err(reason)),
        };
        let after = match self.locate_neighbor(siblings, request, request.after_card_uuid)? {
            Ok(index) => index,
            Err(reason) => return Ok(Err(reason)),
        };

        let expected_after = before.map_or(0, |index| index + 1);
        let adjacent = match after {
            Some(index) => index == expected_after,
            None => expected_after == siblings.len(),
        };
        if !adjacent {
            debug!(
                "event=card_move module=service status=rejected card_uuid={} reason=not_adjacent sibling_count={}",
                request.card_uuid,
                siblings.len()
            );
            return Ok(Err(InvalidMoveReason::NotAdjacent {
                before_card_uuid: request.before_card_uuid,
                after_card_uuid: request.after_card_uuid,
            }));
        }
        Ok(Ok(()))
    }

    fn locate_neighbor(
        &self,
        siblings: &[Card],
        request: &MoveRequest,
        neighbor: Option<CardId>,
    ) -> MoveResult<Result<Option<usize>, InvalidMoveReason>> {
        let Some(neighbor) = neighbor else {
            return Ok(Ok(None));
        };
        if neighbor == request.card_uuid {
            return Ok(Err(InvalidMoveReason::SelfNeighbor {
                card_uuid: neighbor,
            }));
        }
        if let Some(index) = siblings.iter().position(|card| card.card_uuid == neighbor) {
            return Ok(Ok(Some(index)));
        }

        let reason = match self.repo.get_card(neighbor, false)? {
            Some(card) => InvalidMoveReason::NeighborInOtherList {
                card_uuid: neighbor,
                list_uuid: card.list_uuid,
            },
            None => InvalidMoveReason::UnknownNeighbor {
                card_uuid: neighbor,
            },
        };
        Ok(Err(reason))
    }
}

fn rank_of(cards: &[Card], card_uuid: Option<CardId>) -> Option<&Rank> {
    let card_uuid = card_uuid?;
    cards
        .iter()
        .find(|card| card.card_uuid == card_uuid)
        .map(|card| &card.rank)
}
