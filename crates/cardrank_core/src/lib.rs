//! Ordering engine for boards, lists, and cards.
//!
//! Cards are positioned inside a list by lexicographic ranks; moves are
//! guarded by per-card optimistic versions and run one transaction each.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod rank;
pub mod repo;
pub mod service;

pub use config::{ConfigError, CoreConfig};
pub use db::{open_db, open_db_in_memory, open_db_with_config, DbError, DbResult};
pub use logging::{default_log_level, init_logging, init_logging_from_config, logging_status};
pub use model::board::{Board, BoardDetail, BoardId, CardList, ListDetail, ListId};
pub use model::card::{Card, CardId};
pub use rank::lexorank::{Rank, RankError, RankSpace, Ranked};
pub use repo::board_repo::{BoardRepository, SqliteBoardRepository};
pub use repo::card_repo::{CardRepository, SqliteCardRepository};
pub use repo::{RepoError, RepoResult};
pub use service::board_service::{BoardService, BoardServiceError};
pub use service::card_service::{CardService, CardServiceError};
pub use service::move_coordinator::{
    InvalidMoveReason, MoveCoordinator, MoveError, MoveOutcome, MoveRequest,
};

/// Minimal health-check API.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
