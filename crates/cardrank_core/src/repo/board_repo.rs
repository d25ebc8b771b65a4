//! Board/list repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist boards and the lists (containers) they hold.
//! - Keep list ordering inside a board rank-based, like cards in a list.
//!
//! # Invariants
//! - Only live (`deleted_at IS NULL`) rows are returned by default.
//! - Lists are ordered `rank ASC, list_uuid ASC`.

use super::schema::{ensure_connection_ready, parse_rank, parse_uuid};
use super::{RepoError, RepoResult};
use crate::model::board::{Board, BoardId, CardList, ListId};
use crate::rank::lexorank::Rank;
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

/// Persistence contract for boards and lists.
pub trait BoardRepository {
    fn create_board(&self, name: &str, description: Option<&str>) -> RepoResult<Board>;
    fn get_board(&self, board_uuid: BoardId) -> RepoResult<Option<Board>>;
    /// Lists live boards by creation time.
    fn list_boards(&self) -> RepoResult<Vec<Board>>;
    /// Replaces name and description of one live board.
    fn update_board(
        &self,
        board_uuid: BoardId,
        name: &str,
        description: Option<&str>,
    ) -> RepoResult<()>;
    fn soft_delete_board(&self, board_uuid: BoardId) -> RepoResult<()>;
    fn create_list(&self, board_uuid: BoardId, name: &str, rank: &Rank) -> RepoResult<CardList>;
    fn get_list(&self, list_uuid: ListId) -> RepoResult<Option<CardList>>;
    /// Lists live lists of one board ordered by rank.
    fn lists_in_board(&self, board_uuid: BoardId) -> RepoResult<Vec<CardList>>;
    fn rename_list(&self, list_uuid: ListId, name: &str) -> RepoResult<()>;
    /// Persists the rank of one live list.
    fn write_list_rank(&self, list: &CardList) -> RepoResult<()>;
    fn soft_delete_list(&self, list_uuid: ListId) -> RepoResult<()>;
}

/// SQLite-backed board/list repository.
pub struct SqliteBoardRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteBoardRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, &["boards", "card_lists"])?;
        Ok(Self { conn })
    }
}

impl BoardRepository for SqliteBoardRepository<'_> {
    fn create_board(&self, name: &str, description: Option<&str>) -> RepoResult<Board> {
        let board_uuid = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO boards (board_uuid, name, description) VALUES (?1, ?2, ?3);",
            params![board_uuid.to_string(), name, description],
        )?;
        self.get_board(board_uuid)?
            .ok_or(RepoError::BoardNotFound(board_uuid))
    }

    fn get_board(&self, board_uuid: BoardId) -> RepoResult<Option<Board>> {
        let mut stmt = self.conn.prepare(
            "SELECT board_uuid, name, description, created_at, updated_at, deleted_at
             FROM boards
             WHERE board_uuid = ?1
               AND deleted_at IS NULL;",
        )?;
        let mut rows = stmt.query([board_uuid.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_board_row(row)?));
        }
        Ok(None)
    }

    fn list_boards(&self) -> RepoResult<Vec<Board>> {
        let mut stmt = self.conn.prepare(
            "SELECT board_uuid, name, description, created_at, updated_at, deleted_at
             FROM boards
             WHERE deleted_at IS NULL
             ORDER BY created_at ASC, board_uuid ASC;",
        )?;
        let mut rows = stmt.query([])?;
        let mut boards = Vec::new();
        while let Some(row) = rows.next()? {
            boards.push(parse_board_row(row)?);
        }
        Ok(boards)
    }

    fn update_board(
        &self,
        board_uuid: BoardId,
        name: &str,
        description: Option<&str>,
    ) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE boards
             SET name = ?2,
                 description = ?3,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE board_uuid = ?1
               AND deleted_at IS NULL;",
            params![board_uuid.to_string(), name, description],
        )?;
        if changed == 0 {
            return Err(RepoError::BoardNotFound(board_uuid));
        }
        Ok(())
    }

    fn soft_delete_board(&self, board_uuid: BoardId) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE boards
             SET deleted_at = (strftime('%s', 'now') * 1000),
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE board_uuid = ?1
               AND deleted_at IS NULL;",
            [board_uuid.to_string()],
        )?;
        if changed == 0 {
            return Err(RepoError::BoardNotFound(board_uuid));
        }
        Ok(())
    }

    fn create_list(&self, board_uuid: BoardId, name: &str, rank: &Rank) -> RepoResult<CardList> {
        let list_uuid = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO card_lists (list_uuid, board_uuid, name, rank)
             VALUES (?1, ?2, ?3, ?4);",
            params![
                list_uuid.to_string(),
                board_uuid.to_string(),
                name,
                rank.as_str()
            ],
        )?;
        self.get_list(list_uuid)?
            .ok_or(RepoError::ListNotFound(list_uuid))
    }

    fn get_list(&self, list_uuid: ListId) -> RepoResult<Option<CardList>> {
        let mut stmt = self.conn.prepare(
            "SELECT list_uuid, board_uuid, name, rank, created_at, updated_at, deleted_at
             FROM card_lists
             WHERE list_uuid = ?1
               AND deleted_at IS NULL;",
        )?;
        let mut rows = stmt.query([list_uuid.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_list_row(row)?));
        }
        Ok(None)
    }

    fn lists_in_board(&self, board_uuid: BoardId) -> RepoResult<Vec<CardList>> {
        let mut stmt = self.conn.prepare(
            "SELECT list_uuid, board_uuid, name, rank, created_at, updated_at, deleted_at
             FROM card_lists
             WHERE board_uuid = ?1
               AND deleted_at IS NULL
             ORDER BY rank ASC, list_uuid ASC;",
        )?;
        let mut rows = stmt.query([board_uuid.to_string()])?;
        let mut lists = Vec::new();
        while let Some(row) = rows.next()? {
            lists.push(parse_list_row(row)?);
        }
        Ok(lists)
    }

    fn rename_list(&self, list_uuid: ListId, name: &str) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE card_lists
             SET name = ?2,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE list_uuid = ?1
               AND deleted_at IS NULL;",
            params![list_uuid.to_string(), name],
        )?;
        if changed == 0 {
            return Err(RepoError::ListNotFound(list_uuid));
        }
        Ok(())
    }

    fn write_list_rank(&self, list: &CardList) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE card_lists
             SET rank = ?2,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE list_uuid = ?1
               AND deleted_at IS NULL;",
            params![list.list_uuid.to_string(), list.rank.as_str()],
        )?;
        if changed == 0 {
            return Err(RepoError::ListNotFound(list.list_uuid));
        }
        Ok(())
    }

    fn soft_delete_list(&self, list_uuid: ListId) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE card_lists
             SET deleted_at = (strftime('%s', 'now') * 1000),
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE list_uuid = ?1
               AND deleted_at IS NULL;",
            [list_uuid.to_string()],
        )?;
        if changed == 0 {
            return Err(RepoError::ListNotFound(list_uuid));
        }
        Ok(())
    }
}

fn parse_board_row(row: &Row<'_>) -> RepoResult<Board> {
    let board_uuid: String = row.get("board_uuid")?;
    Ok(Board {
        board_uuid: parse_uuid(&board_uuid, "boards.board_uuid")?,
        name: row.get("name")?,
        description: row.get("description")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        deleted_at: row.get("deleted_at")?,
    })
}

fn parse_list_row(row: &Row<'_>) -> RepoResult<CardList> {
    let list_uuid: String = row.get("list_uuid")?;
    let board_uuid: String = row.get("board_uuid")?;
    Ok(CardList {
        list_uuid: parse_uuid(&list_uuid, "card_lists.list_uuid")?,
        board_uuid: parse_uuid(&board_uuid, "card_lists.board_uuid")?,
        name: row.get("name")?,
        rank: parse_rank(row.get("rank")?, "card_lists.rank")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        deleted_at: row.get("deleted_at")?,
    })
}
