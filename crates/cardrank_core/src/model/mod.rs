//! Board domain model.
//!
//! # Responsibility
//! - Define the records the ordering engine reads and writes.
//! - Keep one shape per table so repositories stay thin.
//!
//! # Invariants
//! - Every record is identified by a stable UUID.
//! - Deletion is a `deleted_at` tombstone; rows are never removed.
//! - Display order inside a parent is derived from `rank` alone.

pub mod board;
pub mod card;
