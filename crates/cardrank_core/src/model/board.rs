//! Board and list records.
//!
//! A board groups lists; a list (the container) groups cards. Lists are
//! ordered inside their board by the same rank space cards use.

use crate::model::card::Card;
use crate::rank::lexorank::{Rank, Ranked};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type BoardId = Uuid;
pub type ListId = Uuid;

/// Board read model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    pub board_uuid: BoardId,
    pub name: String,
    pub description: Option<String>,
    /// Epoch ms creation timestamp.
    pub created_at: i64,
    /// Epoch ms update timestamp.
    pub updated_at: i64,
    /// Epoch ms soft-delete marker.
    pub deleted_at: Option<i64>,
}

impl Board {
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }
}

/// Ordered list of cards (a board column).
///
/// Carries no order field for its cards; card order comes from sorting
/// live cards by rank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardList {
    pub list_uuid: ListId,
    pub board_uuid: BoardId,
    pub name: String,
    /// Position of this list inside its board.
    pub rank: Rank,
    pub created_at: i64,
    pub updated_at: i64,
    pub deleted_at: Option<i64>,
}

impl CardList {
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }
}

impl Ranked for CardList {
    fn rank(&self) -> &Rank {
        &self.rank
    }

    fn set_rank(&mut self, rank: Rank) {
        self.rank = rank;
    }
}

/// One live list together with its live cards in display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListDetail {
    pub list: CardList,
    pub cards: Vec<Card>,
}

/// Snapshot of a board: live lists by rank, each with its live cards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardDetail {
    pub board: Board,
    pub lists: Vec<ListDetail>,
}
