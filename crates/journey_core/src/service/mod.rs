//! Use-case services over the journey store.
//!
//! # Responsibility
//! - Orchestrate repository and timeline engine calls into use-case APIs.
//! - Own transaction boundaries so controllers never see partial writes.

pub mod timeline_service;
