//! Journey timeline engine.
//!
//! # Responsibility
//! - Civil-date normalization ([`calendar`]).
//! - Day-set reconciliation against a target window ([`reconcile`]).
//! - Re-anchoring activities of removed days ([`reanchor`]).
//! - Dense day renumbering ([`renumber`]).
//! - Full subtree replacement from a plan skeleton ([`materialize`]).
//!
//! # Invariants
//! - Components never open, commit or roll back transactions; they run on
//!   the repository they are handed and return a value or a fatal reason.

use crate::model::journey::JourneyId;
use crate::repo::journey_repo::RepoError;
use chrono::NaiveDate;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod calendar;
pub mod materialize;
pub mod reanchor;
pub mod reconcile;
pub mod renumber;

pub type TimelineResult<T> = Result<T, TimelineError>;

/// Fatal outcomes of timeline engine components.
#[derive(Debug)]
pub enum TimelineError {
    /// Target window ends before it starts after civil normalization.
    EmptyWindow { start: NaiveDate, end: NaiveDate },
    /// Orphaned days exist but no date survives to re-anchor them onto.
    NoSurvivingDays { orphaned: usize },
    /// Re-anchor target date has no live day row.
    MissingSurvivingDay(NaiveDate),
    /// No journey id and no creation input were supplied.
    MissingCreationInput,
    JourneyNotFound(JourneyId),
    /// Civil date arithmetic left chrono's representable range.
    DateOutOfRange(NaiveDate),
    Repo(RepoError),
}

impl Display for TimelineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyWindow { start, end } => {
                write!(f, "journey window is empty: {start} .. {end}")
            }
            Self::NoSurvivingDays { orphaned } => write!(
                f,
                "no surviving day to re-anchor activities of {orphaned} removed day(s)"
            ),
            Self::MissingSurvivingDay(date) => {
                write!(f, "no live day exists for re-anchor date {date}")
            }
            Self::MissingCreationInput => {
                write!(f, "journey creation input is required when no journey id is given")
            }
            Self::JourneyNotFound(id) => write!(f, "journey not found: {id}"),
            Self::DateOutOfRange(date) => write!(f, "civil date arithmetic overflow from {date}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for TimelineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for TimelineError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}
