//! Core domain logic for journey timelines.
//! This crate is the single source of truth for day and activity invariants.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod timeline;

pub use config::{ConfigError, EngineConfig};
pub use logging::{default_log_level, init_logging, logging_status, LogSettings, LoggingError};
pub use model::journey::{
    AccountId, ActivityId, ActivityType, DayId, Journey, JourneyActivity, JourneyDay,
    JourneyDraft, JourneyId, JourneyTimeline, JourneyValidationError, PoiId, TimelineDay,
};
pub use model::plan::{PlanActivityBlock, PlanDayBlock, PlanSkeleton};
pub use repo::journey_repo::{JourneyRepository, RepoError, RepoResult, SqliteJourneyRepository};
pub use service::timeline_service::{
    ErrorKind, JourneyTimelineService, NewActivity, RescaleOutcome, TimelineServiceError,
};
pub use timeline::calendar::CivilCalendar;

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
