//! Board and list use-case service.
//!
//! # Responsibility
//! - Validate board/list names and board descriptions before persistence.
//! - Assemble the board detail view with one query per level.
//! - Rank lists inside their board, rebalancing sibling lists when an
//!   insertion seam runs out of room.
//!
//! # Invariants
//! - Names are trimmed, non-empty, and at most `MAX_NAME_CHARS` characters.
//! - Descriptions are trimmed, at most `MAX_DESCRIPTION_CHARS` characters;
//!   a blank description is stored as `NULL`.
//! - Lists of one board keep distinct, strictly increasing ranks.

use crate::config::CoreConfig;
use crate::model::board::{Board, BoardDetail, BoardId, CardList, ListDetail, ListId};
use crate::model::card::Card;
use crate::rank::lexorank::{rewrite_order, Rank, RankError, RankSpace};
use crate::repo::board_repo::{BoardRepository, SqliteBoardRepository};
use crate::repo::card_repo::{CardRepository, SqliteCardRepository};
use crate::repo::RepoError;
use log::info;
use rusqlite::{Connection, TransactionBehavior};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Maximum board/list name length in characters.
pub const MAX_NAME_CHARS: usize = 255;
/// Maximum board description length in characters.
pub const MAX_DESCRIPTION_CHARS: usize = 1_000;

/// Errors from board service operations.
#[derive(Debug)]
pub enum BoardServiceError {
    InvalidName,
    NameTooLong(usize),
    DescriptionTooLong(usize),
    BoardNotFound(BoardId),
    ListNotFound(ListId),
    /// Insert anchor is not a live list of the target board.
    AfterListNotInBoard { list_uuid: ListId, board_uuid: BoardId },
    /// Write lock could not be acquired in time; the request may be retried.
    StorageUnavailable(RepoError),
    Rank(RankError),
    Repo(RepoError),
}

impl Display for BoardServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidName => write!(f, "name must not be blank"),
            Self::NameTooLong(chars) => {
                write!(f, "name has {chars} characters; limit is {MAX_NAME_CHARS}")
            }
            Self::DescriptionTooLong(chars) => write!(
                f,
                "description has {chars} characters; limit is {MAX_DESCRIPTION_CHARS}"
            ),
            Self::BoardNotFound(id) => write!(f, "board not found: {id}"),
            Self::ListNotFound(id) => write!(f, "list not found: {id}"),
            Self::AfterListNotInBoard {
                list_uuid,
                board_uuid,
            } => write!(f, "list {list_uuid} is not a live list of board {board_uuid}"),
            Self::StorageUnavailable(err) => write!(f, "storage unavailable: {err}"),
            Self::Rank(err) => write!(f, "{err}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for BoardServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::StorageUnavailable(err) | Self::Repo(err) => Some(err),
            Self::Rank(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for BoardServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::BoardNotFound(board_uuid) => Self::BoardNotFound(board_uuid),
            RepoError::ListNotFound(list_uuid) => Self::ListNotFound(list_uuid),
            other if other.is_busy() => Self::StorageUnavailable(other),
            other => Self::Repo(other),
        }
    }
}

impl From<rusqlite::Error> for BoardServiceError {
    fn from(value: rusqlite::Error) -> Self {
        RepoError::from(value).into()
    }
}

impl From<RankError> for BoardServiceError {
    fn from(value: RankError) -> Self {
        Self::Rank(value)
    }
}

pub type BoardServiceResult<T> = Result<T, BoardServiceError>;

/// Board service facade over one SQLite connection.
pub struct BoardService<'conn> {
    conn: &'conn mut Connection,
    rank_space: RankSpace,
}

impl<'conn> BoardService<'conn> {
    pub fn new(conn: &'conn mut Connection) -> Self {
        Self::with_rank_space(conn, RankSpace::default())
    }

    pub fn from_config(conn: &'conn mut Connection, config: &CoreConfig) -> Self {
        Self::with_rank_space(conn, config.rank_space())
    }

    pub fn with_rank_space(conn: &'conn mut Connection, rank_space: RankSpace) -> Self {
        Self { conn, rank_space }
    }

    pub fn create_board(
        &self,
        name: impl Into<String>,
        description: Option<String>,
    ) -> BoardServiceResult<Board> {
        let name = normalize_name(name.into())?;
        let description = normalize_description(description)?;
        let board = self.repo()?.create_board(&name, description.as_deref())?;
        info!(
            "event=board_create module=service status=ok board_uuid={}",
            board.board_uuid
        );
        Ok(board)
    }

    pub fn get_board(&self, board_uuid: BoardId) -> BoardServiceResult<Board> {
        self.repo()?
            .get_board(board_uuid)?
            .ok_or(BoardServiceError::BoardNotFound(board_uuid))
    }

    pub fn list_boards(&self) -> BoardServiceResult<Vec<Board>> {
        Ok(self.repo()?.list_boards()?)
    }

    /// Updates name and/or description; `None` leaves a field unchanged
    /// and a blank description clears it.
    pub fn update_board(
        &self,
        board_uuid: BoardId,
        name: Option<String>,
        description: Option<String>,
    ) -> BoardServiceResult<Board> {
        let repo = self.repo()?;
        let current = repo
            .get_board(board_uuid)?
            .ok_or(BoardServiceError::BoardNotFound(board_uuid))?;

        let name = match name {
            Some(value) => normalize_name(value)?,
            None => current.name,
        };
        let description = match description {
            Some(value) => normalize_description(Some(value))?,
            None => current.description,
        };

        repo.update_board(board_uuid, &name, description.as_deref())?;
        info!("event=board_update module=service status=ok board_uuid={board_uuid}");
        repo.get_board(board_uuid)?
            .ok_or(BoardServiceError::BoardNotFound(board_uuid))
    }

    /// Loads a live board with its live lists (by rank) and each list's
    /// live cards (by rank).
    ///
    /// Runs three queries inside one read transaction regardless of how
    /// many lists the board holds.
    pub fn board_detail(&mut self, board_uuid: BoardId) -> BoardServiceResult<BoardDetail> {
        let tx = self.conn.transaction()?;
        let detail = {
            let boards = SqliteBoardRepository::try_new(&tx)?;
            let board = boards
                .get_board(board_uuid)?
                .ok_or(BoardServiceError::BoardNotFound(board_uuid))?;
            let lists = boards.lists_in_board(board_uuid)?;
            let cards = SqliteCardRepository::try_new(&tx)?.live_cards_in_board(board_uuid)?;
            assemble_detail(board, lists, cards)
        };
        tx.commit()?;
        Ok(detail)
    }

    /// Soft-deletes a board. Its lists and cards become unreachable for
    /// moves but their rows are kept.
    pub fn delete_board(&self, board_uuid: BoardId) -> BoardServiceResult<()> {
        self.repo()?.soft_delete_board(board_uuid)?;
        Ok(())
    }

    /// Creates a list at the end of `board_uuid`, or right after
    /// `after_list_uuid` when given.
    pub fn create_list(
        &mut self,
        board_uuid: BoardId,
        name: impl Into<String>,
        after_list_uuid: Option<ListId>,
    ) -> BoardServiceResult<CardList> {
        let name = normalize_name(name.into())?;
        let rank_space = self.rank_space;

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let list = {
            let repo = SqliteBoardRepository::try_new(&tx)?;
            if repo.get_board(board_uuid)?.is_none() {
                return Err(BoardServiceError::BoardNotFound(board_uuid));
            }

            let mut lists = repo.lists_in_board(board_uuid)?;
            let index = match after_list_uuid {
                Some(after) => lists
                    .iter()
                    .position(|list| list.list_uuid == after)
                    .map(|index| index + 1)
                    .ok_or(BoardServiceError::AfterListNotInBoard {
                        list_uuid: after,
                        board_uuid,
                    })?,
                None => lists.len(),
            };

            let rank = match list_rank_at(&rank_space, &lists, index) {
                Ok(rank) => rank,
                Err(RankError::NeedsRebalance { .. }) => {
                    let before: Vec<Rank> = lists.iter().map(|list| list.rank.clone()).collect();
                    rank_space.rebalance(&mut lists)?;
                    let after: Vec<Rank> = lists.iter().map(|list| list.rank.clone()).collect();
                    for index in rewrite_order(&before, &after) {
                        repo.write_list_rank(&lists[index])?;
                    }
                    info!(
                        "event=board_rebalance module=service status=ok board_uuid={board_uuid} list_count={}",
                        lists.len()
                    );
                    list_rank_at(&rank_space, &lists, index).map_err(|_| {
                        RankError::RebalanceFailure {
                            item_count: lists.len() + 1,
                            max_rank_length: rank_space.max_rank_length(),
                        }
                    })?
                }
                Err(other) => return Err(other.into()),
            };
            repo.create_list(board_uuid, &name, &rank)?
        };
        tx.commit()?;

        info!(
            "event=list_create module=service status=ok list_uuid={} board_uuid={} rank={}",
            list.list_uuid, list.board_uuid, list.rank
        );
        Ok(list)
    }

    pub fn get_list(&self, list_uuid: ListId) -> BoardServiceResult<CardList> {
        self.repo()?
            .get_list(list_uuid)?
            .ok_or(BoardServiceError::ListNotFound(list_uuid))
    }

    /// Lists live lists of a live board in display order.
    pub fn lists_in_board(&self, board_uuid: BoardId) -> BoardServiceResult<Vec<CardList>> {
        let repo = self.repo()?;
        if repo.get_board(board_uuid)?.is_none() {
            return Err(BoardServiceError::BoardNotFound(board_uuid));
        }
        Ok(repo.lists_in_board(board_uuid)?)
    }

    pub fn rename_list(
        &self,
        list_uuid: ListId,
        name: impl Into<String>,
    ) -> BoardServiceResult<CardList> {
        let name = normalize_name(name.into())?;
        let repo = self.repo()?;
        repo.rename_list(list_uuid, &name)?;
        repo.get_list(list_uuid)?
            .ok_or(BoardServiceError::ListNotFound(list_uuid))
    }

    /// Soft-deletes a list; its cards stay in storage but reject moves.
    pub fn delete_list(&self, list_uuid: ListId) -> BoardServiceResult<()> {
        self.repo()?.soft_delete_list(list_uuid)?;
        Ok(())
    }

    fn repo(&self) -> BoardServiceResult<SqliteBoardRepository<'_>> {
        Ok(SqliteBoardRepository::try_new(&*self.conn)?)
    }
}

/// Rank for a list inserted at `index` of the ordered `lists`.
fn list_rank_at(
    rank_space: &RankSpace,
    lists: &[CardList],
    index: usize,
) -> Result<Rank, RankError> {
    let lower = index
        .checked_sub(1)
        .and_then(|prev| lists.get(prev))
        .map(|list| &list.rank);
    let upper = lists.get(index).map(|list| &list.rank);
    rank_space.rank_between(lower, upper)
}

/// Distributes `cards` (any order across lists, rank order within one)
/// onto their lists; lists keep the order given.
fn assemble_detail(board: Board, lists: Vec<CardList>, cards: Vec<Card>) -> BoardDetail {
    let mut by_list: HashMap<ListId, Vec<Card>> = HashMap::new();
    for card in cards {
        by_list.entry(card.list_uuid).or_default().push(card);
    }
    let lists = lists
        .into_iter()
        .map(|list| ListDetail {
            cards: by_list.remove(&list.list_uuid).unwrap_or_default(),
            list,
        })
        .collect();
    BoardDetail { board, lists }
}

fn normalize_description(value: Option<String>) -> BoardServiceResult<Option<String>> {
    let Some(trimmed) = value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
    else {
        return Ok(None);
    };
    let chars = trimmed.chars().count();
    if chars > MAX_DESCRIPTION_CHARS {
        return Err(BoardServiceError::DescriptionTooLong(chars));
    }
    Ok(Some(trimmed))
}

fn normalize_name(value: String) -> BoardServiceResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(BoardServiceError::InvalidName);
    }
    let chars = trimmed.chars().count();
    if chars > MAX_NAME_CHARS {
        return Err(BoardServiceError::NameTooLong(chars));
    }
    Ok(trimmed.to_string())
}
