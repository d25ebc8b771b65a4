//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the data access contracts the move protocol consumes.
//! - Isolate SQLite query details from coordinator/service orchestration.
//!
//! # Invariants
//! - Live-only reads filter on `deleted_at IS NULL`.
//! - Repositories never open or commit transactions for moves; the
//!   caller owns the transaction boundary.
//! - Ranks read back from storage are validated, not trusted.

pub mod board_repo;
pub mod card_repo;
mod error;
mod schema;

pub use error::{RepoError, RepoResult};
