//! Use-case services over the repositories.
//!
//! # Responsibility
//! - Own transaction boundaries; repositories never commit.
//! - Translate repository and rank failures into caller-facing errors.
//!
//! # Invariants
//! - Multi-statement writes run inside one IMMEDIATE transaction;
//!   single-row updates rely on statement atomicity.
//! - Move decisions (`Conflict`, `InvalidRequest`) are values, not errors.

pub mod board_service;
pub mod card_service;
pub mod move_coordinator;
