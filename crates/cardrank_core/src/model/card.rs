//! Card record, the movable unit of the ordering engine.
//!
//! # Invariants
//! - `card_uuid` never changes.
//! - `list_uuid` and `rank` change only through a move (or a restore,
//!   which re-appends the card).
//! - `version` starts at 1 and grows by exactly one per successful move.

use crate::model::board::ListId;
use crate::rank::lexorank::{Rank, Ranked};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type CardId = Uuid;

/// Version assigned to freshly created cards.
pub const INITIAL_VERSION: i64 = 1;

/// Card read model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub card_uuid: CardId,
    /// Owning list.
    pub list_uuid: ListId,
    pub title: String,
    pub description: Option<String>,
    /// Position key, unique among live cards of the same list.
    pub rank: Rank,
    /// Optimistic concurrency token.
    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
    /// Soft-deleted cards take no part in ranking.
    pub deleted_at: Option<i64>,
}

impl Card {
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }
}

impl Ranked for Card {
    fn rank(&self) -> &Rank {
        &self.rank
    }

    fn set_rank(&mut self, rank: Rank) {
        self.rank = rank;
    }
}
