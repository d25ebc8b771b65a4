//! Card repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide the persistence operations the move protocol consumes:
//!   row lock, ordered live listing, and single-row write.
//! - Provide card create/update/delete/restore persistence.
//!
//! # Invariants
//! - Live listings are ordered `rank ASC, card_uuid ASC` with SQLite's
//!   BINARY collation, i.e. byte-wise.
//! - `write_card` persists `list_uuid`, `rank` and `version` exactly as given.
//! - `lock_card_for_update` requires an open transaction.

use super::schema::{ensure_connection_ready, parse_rank, parse_uuid};
use super::{RepoError, RepoResult};
use crate::model::board::{BoardId, ListId};
use crate::model::card::{Card, CardId, INITIAL_VERSION};
use crate::rank::lexorank::Rank;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

const CARD_SELECT_SQL: &str = "SELECT
    card_uuid,
    list_uuid,
    title,
    description,
    rank,
    version,
    created_at,
    updated_at,
    deleted_at
FROM cards";

/// Persistence contract for cards.
///
/// Implementations must run every call of one move inside the same
/// transaction; the caller owns begin/commit/rollback.
pub trait CardRepository {
    /// Loads one live card and holds its row exclusively until the
    /// surrounding transaction ends.
    fn lock_card_for_update(&self, card_uuid: CardId) -> RepoResult<Option<Card>>;
    /// Loads one card by id.
    fn get_card(&self, card_uuid: CardId, include_deleted: bool) -> RepoResult<Option<Card>>;
    /// Lists live cards of one list ordered by rank.
    fn live_cards_in_list(&self, list_uuid: ListId) -> RepoResult<Vec<Card>>;
    /// Lists live cards of every live list of one board, grouped by list
    /// and ordered by rank inside each list.
    fn live_cards_in_board(&self, board_uuid: BoardId) -> RepoResult<Vec<Card>>;
    /// Highest rank among live cards of one list.
    fn last_live_rank(&self, list_uuid: ListId) -> RepoResult<Option<Rank>>;
    /// Whether the list and its board are both live.
    fn list_is_live(&self, list_uuid: ListId) -> RepoResult<bool>;
    /// Persists list, rank and version of one live card.
    fn write_card(&self, card: &Card) -> RepoResult<()>;
    /// Inserts a new card at `INITIAL_VERSION`.
    fn insert_card(
        &self,
        list_uuid: ListId,
        title: &str,
        description: Option<&str>,
        rank: &Rank,
    ) -> RepoResult<Card>;
    /// Replaces title and description of one live card.
    fn update_card_content(
        &self,
        card_uuid: CardId,
        title: &str,
        description: Option<&str>,
    ) -> RepoResult<()>;
    /// Sets the soft-delete marker of one live card.
    fn soft_delete_card(&self, card_uuid: CardId) -> RepoResult<()>;
    /// Clears the soft-delete marker and persists rank and version.
    fn restore_card(&self, card: &Card) -> RepoResult<()>;
}

/// SQLite-backed card repository.
///
/// Accepts a plain connection or a `Transaction` (through deref).
pub struct SqliteCardRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteCardRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_connection_ready(conn, &["boards", "card_lists", "cards"])?;
        Ok(Self { conn })
    }
}

impl CardRepository for SqliteCardRepository<'_> {
    fn lock_card_for_update(&self, card_uuid: CardId) -> RepoResult<Option<Card>> {
        // SQLite has no row locks; an IMMEDIATE transaction already holds
        // the database write lock, which covers this row.
        if self.conn.is_autocommit() {
            return Err(RepoError::NoActiveTransaction);
        }
        self.get_card(card_uuid, false)
    }

    fn get_card(&self, card_uuid: CardId, include_deleted: bool) -> RepoResult<Option<Card>> {
        let mut stmt = self.conn.prepare(&format!(
            "{CARD_SELECT_SQL}
             WHERE card_uuid = ?1
               AND (?2 = 1 OR deleted_at IS NULL);"
        ))?;
        let mut rows = stmt.query(params![card_uuid.to_string(), i64::from(include_deleted)])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_card_row(row)?));
        }
        Ok(None)
    }

    fn live_cards_in_list(&self, list_uuid: ListId) -> RepoResult<Vec<Card>> {
        let mut stmt = self.conn.prepare(&format!(
            "{CARD_SELECT_SQL}
             WHERE list_uuid = ?1
               AND deleted_at IS NULL
             ORDER BY rank ASC, card_uuid ASC;"
        ))?;
        let mut rows = stmt.query([list_uuid.to_string()])?;
        let mut cards = Vec::new();
        while let Some(row) = rows.next()? {
            cards.push(parse_card_row(row)?);
        }
        Ok(cards)
    }

    fn live_cards_in_board(&self, board_uuid: BoardId) -> RepoResult<Vec<Card>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                c.card_uuid,
                c.list_uuid,
                c.title,
                c.description,
                c.rank,
                c.version,
                c.created_at,
                c.updated_at,
                c.deleted_at
             FROM cards c
             INNER JOIN card_lists l ON l.list_uuid = c.list_uuid
             WHERE l.board_uuid = ?1
               AND l.deleted_at IS NULL
               AND c.deleted_at IS NULL
             ORDER BY c.list_uuid ASC, c.rank ASC, c.card_uuid ASC;",
        )?;
        let mut rows = stmt.query([board_uuid.to_string()])?;
        let mut cards = Vec::new();
        while let Some(row) = rows.next()? {
            cards.push(parse_card_row(row)?);
        }
        Ok(cards)
    }

    fn last_live_rank(&self, list_uuid: ListId) -> RepoResult<Option<Rank>> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT rank
                 FROM cards
                 WHERE list_uuid = ?1
                   AND deleted_at IS NULL
                 ORDER BY rank DESC
                 LIMIT 1;",
                [list_uuid.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        value
            .map(|value| parse_rank(value, "cards.rank"))
            .transpose()
    }

    fn list_is_live(&self, list_uuid: ListId) -> RepoResult<bool> {
        let live: i64 = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM card_lists l
                INNER JOIN boards b ON b.board_uuid = l.board_uuid
                WHERE l.list_uuid = ?1
                  AND l.deleted_at IS NULL
                  AND b.deleted_at IS NULL
            );",
            [list_uuid.to_string()],
            |row| row.get(0),
        )?;
        Ok(live == 1)
    }

    fn write_card(&self, card: &Card) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE cards
             SET list_uuid = ?2,
                 rank = ?3,
                 version = ?4,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE card_uuid = ?1
               AND deleted_at IS NULL;",
            params![
                card.card_uuid.to_string(),
                card.list_uuid.to_string(),
                card.rank.as_str(),
                card.version,
            ],
        )?;
        if changed == 0 {
            return Err(RepoError::CardNotFound(card.card_uuid));
        }
        Ok(())
    }

    fn insert_card(
        &self,
        list_uuid: ListId,
        title: &str,
        description: Option<&str>,
        rank: &Rank,
    ) -> RepoResult<Card> {
        let card_uuid = Uuid::new_v4();
        self.conn.execute(
            "INSERT INTO cards (
                card_uuid,
                list_uuid,
                title,
                description,
                rank,
                version
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                card_uuid.to_string(),
                list_uuid.to_string(),
                title,
                description,
                rank.as_str(),
                INITIAL_VERSION,
            ],
        )?;
        self.get_card(card_uuid, false)?
            .ok_or(RepoError::CardNotFound(card_uuid))
    }

    fn update_card_content(
        &self,
        card_uuid: CardId,
        title: &str,
        description: Option<&str>,
    ) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE cards
             SET title = ?2,
                 description = ?3,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE card_uuid = ?1
               AND deleted_at IS NULL;",
            params![card_uuid.to_string(), title, description],
        )?;
        if changed == 0 {
            return Err(RepoError::CardNotFound(card_uuid));
        }
        Ok(())
    }

    fn soft_delete_card(&self, card_uuid: CardId) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE cards
             SET deleted_at = (strftime('%s', 'now') * 1000),
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE card_uuid = ?1
               AND deleted_at IS NULL;",
            [card_uuid.to_string()],
        )?;
        if changed == 0 {
            return Err(RepoError::CardNotFound(card_uuid));
        }
        Ok(())
    }

    fn restore_card(&self, card: &Card) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE cards
             SET deleted_at = NULL,
                 rank = ?2,
                 version = ?3,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE card_uuid = ?1
               AND deleted_at IS NOT NULL;",
            params![card.card_uuid.to_string(), card.rank.as_str(), card.version],
        )?;
        if changed == 0 {
            return Err(RepoError::CardNotFound(card.card_uuid));
        }
        Ok(())
    }
}

fn parse_card_row(row: &Row<'_>) -> RepoResult<Card> {
    let card_uuid: String = row.get("card_uuid")?;
    let list_uuid: String = row.get("list_uuid")?;
    let version: i64 = row.get("version")?;
    if version < 1 {
        return Err(RepoError::InvalidData(format!(
            "invalid version `{version}` in cards.version"
        )));
    }

    Ok(Card {
        card_uuid: parse_uuid(&card_uuid, "cards.card_uuid")?,
        list_uuid: parse_uuid(&list_uuid, "cards.list_uuid")?,
        title: row.get("title")?,
        description: row.get("description")?,
        rank: parse_rank(row.get("rank")?, "cards.rank")?,
        version,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        deleted_at: row.get("deleted_at")?,
    })
}
