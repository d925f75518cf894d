//! Repository layer for journey timelines.
//!
//! # Responsibility
//! - Define the storage contract the timeline engine is written against.
//! - Isolate SQLite query details from engine and service orchestration.
//!
//! # Invariants
//! - Repository APIs return semantic not-found errors in addition to
//!   transport errors.
//! - Tombstoned rows are invisible on every default read path.

pub mod journey_repo;
