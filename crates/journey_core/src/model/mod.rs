//! Journey timeline domain model.
//!
//! # Responsibility
//! - Define the journey → day → activity records shared by repository,
//!   engine and service layers.
//! - Define the plan skeleton shape produced by the planning collaborator.
//!
//! # Invariants
//! - Every record is identified by a stable UUID that is never reused.
//! - Deletion is a soft-delete tombstone, never a physical removal.

pub mod journey;
pub mod plan;
