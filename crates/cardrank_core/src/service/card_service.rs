//! Card use-case service.
//!
//! # Responsibility
//! - Own the transaction boundary of card writes that touch ranks: one
//!   IMMEDIATE transaction per request.
//! - Wrap `MoveCoordinator` for moves: commit on success, roll back on
//!   conflict, rejection, or error.
//! - Provide card create/read/update/delete/restore for the board surface.
//!
//! # Invariants
//! - Only moves and restores change `rank`, `list_uuid`, or `version`.
//! - Content updates never bump `version`.
//! - Lock contention surfaces as `StorageUnavailable`; nothing is retried.

use crate::config::CoreConfig;
use crate::model::board::ListId;
use crate::model::card::{Card, CardId};
use crate::rank::lexorank::{Rank, RankError, RankSpace};
use crate::repo::card_repo::{CardRepository, SqliteCardRepository};
use crate::repo::RepoError;
use crate::service::move_coordinator::{MoveCoordinator, MoveError, MoveOutcome, MoveRequest};
use log::{error, info, warn};
use rusqlite::{Connection, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Maximum card title length in characters.
pub const MAX_TITLE_CHARS: usize = 255;

/// Errors from card service operations.
#[derive(Debug)]
pub enum CardServiceError {
    /// Title is blank after trim.
    InvalidTitle,
    /// Title exceeds `MAX_TITLE_CHARS`.
    TitleTooLong(usize),
    /// Card does not exist or is soft-deleted.
    CardNotFound(CardId),
    /// List does not exist or is soft-deleted.
    ListNotFound(ListId),
    /// Insert anchor is not a live card of the target list.
    AfterCardNotInList { card_uuid: CardId, list_uuid: ListId },
    /// Write lock could not be acquired in time; the request may be retried.
    StorageUnavailable(RepoError),
    /// Rank invariant violation, e.g. `RebalanceFailure`.
    Rank(RankError),
    /// Repository-level failure.
    Repo(RepoError),
}

impl CardServiceError {
    /// Whether the caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_))
    }
}

impl Display for CardServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidTitle => write!(f, "card title must not be blank"),
            Self::TitleTooLong(chars) => write!(
                f,
                "card title has {chars} characters; limit is {MAX_TITLE_CHARS}"
            ),
            Self::CardNotFound(id) => write!(f, "card not found: {id}"),
            Self::ListNotFound(id) => write!(f, "list not found: {id}"),
            Self::AfterCardNotInList {
                card_uuid,
                list_uuid,
            } => write!(f, "card {card_uuid} is not a live card of list {list_uuid}"),
            Self::StorageUnavailable(err) => write!(f, "storage unavailable: {err}"),
            Self::Rank(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for CardServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::StorageUnavailable(err) | Self::Repo(err) => Some(err),
            Self::Rank(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for CardServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::CardNotFound(card_uuid) => Self::CardNotFound(card_uuid),
            RepoError::ListNotFound(list_uuid) => Self::ListNotFound(list_uuid),
            other if other.is_busy() => Self::StorageUnavailable(other),
            other => Self::Repo(other),
        }
    }
}

impl From<rusqlite::Error> for CardServiceError {
    fn from(value: rusqlite::Error) -> Self {
        RepoError::from(value).into()
    }
}

impl From<MoveError> for CardServiceError {
    fn from(value: MoveError) -> Self {
        match value {
            MoveError::Repo(err) => err.into(),
            MoveError::Rank(err) => Self::Rank(err),
        }
    }
}

pub type CardServiceResult<T> = Result<T, CardServiceError>;

/// Card service facade over one SQLite connection.
pub struct CardService<'conn> {
    conn: &'conn mut Connection,
    rank_space: RankSpace,
}

impl<'conn> CardService<'conn> {
    /// Creates a service with the default rank space.
    pub fn new(conn: &'conn mut Connection) -> Self {
        Self::with_rank_space(conn, RankSpace::default())
    }

    /// Creates a service using the rank threshold from `config`.
    pub fn from_config(conn: &'conn mut Connection, config: &CoreConfig) -> Self {
        Self::with_rank_space(conn, config.rank_space())
    }

    pub fn with_rank_space(conn: &'conn mut Connection, rank_space: RankSpace) -> Self {
        Self { conn, rank_space }
    }

    /// Creates a card at the end of `list_uuid`, or right after
    /// `after_card_uuid` when given.
    pub fn create_card(
        &mut self,
        list_uuid: ListId,
        title: impl Into<String>,
        description: Option<String>,
        after_card_uuid: Option<CardId>,
    ) -> CardServiceResult<Card> {
        let title = normalize_title(title.into())?;
        let description = normalize_description(description);

        let card = self.with_transaction(|coordinator| {
            let repo = coordinator.repo();
            if !repo.list_is_live(list_uuid)? {
                return Err(CardServiceError::ListNotFound(list_uuid));
            }
            let rank = match after_card_uuid {
                Some(card_uuid) => coordinator
                    .rank_after_card(list_uuid, card_uuid)?
                    .ok_or(CardServiceError::AfterCardNotInList {
                        card_uuid,
                        list_uuid,
                    })?,
                None => coordinator.create_initial_rank(list_uuid)?,
            };
            Ok(repo.insert_card(list_uuid, &title, description.as_deref(), &rank)?)
        })?;

        info!(
            "event=card_create module=service status=ok card_uuid={} list_uuid={} rank={}",
            card.card_uuid, card.list_uuid, card.rank
        );
        Ok(card)
    }

    /// Returns the rank a new card appended to `list_uuid` would get now.
    ///
    /// The rank is not reserved: a later append or move may take it, so
    /// callers that insert should use `create_card`, which computes and
    /// writes the rank in one transaction. When the tail of the list is
    /// exhausted, the rebalance that makes room is committed before the
    /// rank is returned.
    pub fn create_initial_rank(&mut self, list_uuid: ListId) -> CardServiceResult<Rank> {
        self.with_transaction(|coordinator| {
            let repo = coordinator.repo();
            if !repo.list_is_live(list_uuid)? {
                return Err(CardServiceError::ListNotFound(list_uuid));
            }
            Ok(coordinator.create_initial_rank(list_uuid)?)
        })
    }

    /// Loads one live card.
    pub fn get_card(&self, card_uuid: CardId) -> CardServiceResult<Card> {
        self.repo()?
            .get_card(card_uuid, false)?
            .ok_or(CardServiceError::CardNotFound(card_uuid))
    }

    /// Lists live cards of one live list in display order.
    pub fn cards_in_list(&self, list_uuid: ListId) -> CardServiceResult<Vec<Card>> {
        let repo = self.repo()?;
        if !repo.list_is_live(list_uuid)? {
            return Err(CardServiceError::ListNotFound(list_uuid));
        }
        Ok(repo.live_cards_in_list(list_uuid)?)
    }

    /// Updates title and/or description; `None` leaves a field unchanged
    /// and an empty description clears it.
    pub fn update_card(
        &self,
        card_uuid: CardId,
        title: Option<String>,
        description: Option<String>,
    ) -> CardServiceResult<Card> {
        let repo = self.repo()?;
        let current = repo
            .get_card(card_uuid, false)?
            .ok_or(CardServiceError::CardNotFound(card_uuid))?;

        let title = match title {
            Some(value) => normalize_title(value)?,
            None => current.title,
        };
        let description = match description {
            Some(value) => normalize_description(Some(value)),
            None => current.description,
        };

        repo.update_card_content(card_uuid, &title, description.as_deref())?;
        repo.get_card(card_uuid, false)?
            .ok_or(CardServiceError::CardNotFound(card_uuid))
    }

    /// Soft-deletes one card; the row is kept.
    pub fn delete_card(&self, card_uuid: CardId) -> CardServiceResult<()> {
        self.repo()?.soft_delete_card(card_uuid)?;
        Ok(())
    }

    /// Restores a soft-deleted card at the end of its list with a fresh
    /// rank; its pre-deletion rank may be stale after rebalances.
    ///
    /// Restoring a live card returns it unchanged.
    pub fn restore_card(&mut self, card_uuid: CardId) -> CardServiceResult<Card> {
        let card = self.with_transaction(|coordinator| {
            let repo = coordinator.repo();
            let mut card = repo
                .get_card(card_uuid, true)?
                .ok_or(CardServiceError::CardNotFound(card_uuid))?;
            if card.is_live() {
                return Ok(card);
            }
            if !repo.list_is_live(card.list_uuid)? {
                return Err(CardServiceError::ListNotFound(card.list_uuid));
            }

            card.rank = coordinator.create_initial_rank(card.list_uuid)?;
            card.version += 1;
            repo.restore_card(&card)?;
            repo.get_card(card_uuid, false)?
                .ok_or(CardServiceError::CardNotFound(card_uuid))
        })?;

        info!(
            "event=card_restore module=service status=ok card_uuid={} rank={} version={}",
            card.card_uuid, card.rank, card.version
        );
        Ok(card)
    }

    /// Moves one card inside its own IMMEDIATE transaction.
    ///
    /// Acquiring the write lock is the only blocking point. The
    /// transaction commits only on `MoveOutcome::Success`.
    pub fn move_card(&mut self, request: &MoveRequest) -> CardServiceResult<MoveOutcome> {
        let started_at = Instant::now();
        let rank_space = self.rank_space;
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|err| log_move_error(request, err.into(), started_at))?;

        let decided = SqliteCardRepository::try_new(&tx)
            .map_err(MoveError::from)
            .and_then(|repo| MoveCoordinator::new(repo, rank_space).move_card(request));

        let outcome = match decided {
            Ok(outcome) => outcome,
            Err(err) => {
                // Dropping `tx` rolls back any rebalance writes.
                drop(tx);
                return Err(log_move_error(request, err.into(), started_at));
            }
        };

        if outcome.is_success() {
            tx.commit()
                .map_err(|err| log_move_error(request, err.into(), started_at))?;
        } else {
            tx.rollback()
                .map_err(|err| log_move_error(request, err.into(), started_at))?;
        }

        log_move(request, &outcome, started_at);
        Ok(outcome)
    }

    fn repo(&self) -> CardServiceResult<SqliteCardRepository<'_>> {
        Ok(SqliteCardRepository::try_new(&*self.conn)?)
    }

    /// Runs `work` in one IMMEDIATE transaction, committing on `Ok`.
    fn with_transaction<T>(
        &mut self,
        work: impl FnOnce(&MoveCoordinator<SqliteCardRepository<'_>>) -> CardServiceResult<T>,
    ) -> CardServiceResult<T> {
        let rank_space = self.rank_space;
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = {
            let coordinator = MoveCoordinator::new(SqliteCardRepository::try_new(&tx)?, rank_space);
            work(&coordinator)?
        };
        tx.commit()?;
        Ok(value)
    }
}

fn log_move(request: &MoveRequest, outcome: &MoveOutcome, started_at: Instant) {
    let duration_ms = started_at.elapsed().as_millis();
    match outcome {
        MoveOutcome::Success { card } => info!(
            "event=card_move module=service status=ok card_uuid={} list_uuid={} rank={} version={} duration_ms={duration_ms}",
            card.card_uuid, card.list_uuid, card.rank, card.version
        ),
        MoveOutcome::Conflict { current_version } => warn!(
            "event=card_move module=service status=conflict card_uuid={} expected_version={} current_version={current_version} duration_ms={duration_ms}",
            request.card_uuid, request.expected_version
        ),
        MoveOutcome::InvalidRequest { reason } => warn!(
            "event=card_move module=service status=rejected card_uuid={} target_list_uuid={} reason=\"{reason}\" duration_ms={duration_ms}",
            request.card_uuid, request.target_list_uuid
        ),
    }
}

fn log_move_error(
    request: &MoveRequest,
    err: CardServiceError,
    started_at: Instant,
) -> CardServiceError {
    let error_code = if err.is_retryable() {
        "storage_unavailable"
    } else {
        "move_failed"
    };
    error!(
        "event=card_move module=service status=error card_uuid={} duration_ms={} error_code={error_code} error={err}",
        request.card_uuid,
        started_at.elapsed().as_millis()
    );
    err
}

fn normalize_title(value: String) -> CardServiceResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CardServiceError::InvalidTitle);
    }
    let chars = trimmed.chars().count();
    if chars > MAX_TITLE_CHARS {
        return Err(CardServiceError::TitleTooLong(chars));
    }
    Ok(trimmed.to_string())
}

fn normalize_description(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
