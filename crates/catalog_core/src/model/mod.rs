//! Catalog domain model.
//!
//! # Responsibility
//! - Define the base record every catalog object is persisted as.
//! - Own the textual timestamp format used on the persistence boundary.
//!
//! # Invariants
//! - Every record is identified by a stable `RecordId`.
//! - Timestamps cross the boundary only as `YYYY-MM-DDTHH:MM:SS.ffffff` text.

pub mod record;
pub mod timestamp;
