//! Rank space for ordered lists.
//!
//! # Responsibility
//! - Produce position keys that sort strictly between two neighbors.
//! - Redistribute keys of one list when an insertion seam is exhausted.
//!
//! # Invariants
//! - Rank comparison is purely byte-wise lexicographic.
//! - Rank computation is pure and storage-agnostic.

pub mod lexorank;
