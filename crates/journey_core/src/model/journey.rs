//! Journey, day and activity records.
//!
//! # Invariants
//! - `JourneyDay::date` is always a civil-midnight instant in the engine's
//!   configured timezone; a date change is delete-then-create.
//! - `JourneyDay::day_number` is 1-based; density across live days is kept
//!   by the renumbering pass, not by this type.
//! - `end` fields are never earlier than their `start`/`time` counterpart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type JourneyId = Uuid;
pub type DayId = Uuid;
pub type ActivityId = Uuid;
/// Opaque reference to a point of interest owned by the POI catalogue.
pub type PoiId = Uuid;
/// Authenticated account identifier handed in by the identity layer.
pub type AccountId = Uuid;

/// Kind tag carried by every activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    /// Visit to a sight or venue.
    #[default]
    Place,
    Food,
    Stay,
    Transport,
    Other,
}

impl ActivityType {
    pub fn as_db_str(self) -> &'static str {
        match self {
            Self::Place => "place",
            Self::Food => "food",
            Self::Stay => "stay",
            Self::Transport => "transport",
            Self::Other => "other",
        }
    }

    pub fn from_db_str(value: &str) -> Option<Self> {
        match value {
            "place" => Some(Self::Place),
            "food" => Some(Self::Food),
            "stay" => Some(Self::Stay),
            "transport" => Some(Self::Transport),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

/// Validation failures for journey records before persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JourneyValidationError {
    BlankTitle,
    JourneyEndBeforeStart {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    InvalidDayNumber(i64),
    ActivityEndBeforeStart {
        activity_id: ActivityId,
        time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    },
}

impl Display for JourneyValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankTitle => write!(f, "journey title must not be blank"),
            Self::JourneyEndBeforeStart { start, end } => {
                write!(f, "journey end {end} is before start {start}")
            }
            Self::InvalidDayNumber(value) => {
                write!(f, "day number must be >= 1, got {value}")
            }
            Self::ActivityEndBeforeStart {
                activity_id,
                time,
                end_time,
            } => write!(
                f,
                "activity {activity_id} ends at {end_time}, before its start {time}"
            ),
        }
    }
}

impl Error for JourneyValidationError {}

/// A planned trip owned by one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Journey {
    pub id: JourneyId,
    pub account_id: AccountId,
    pub title: String,
    /// Free-text location label, e.g. a province or city name.
    pub location: String,
    pub start: DateTime<Utc>,
    /// `None` means the window is open-ended; day rows still define the
    /// materialized timeline.
    pub end: Option<DateTime<Utc>>,
    pub is_shared: bool,
    pub is_completed: bool,
    pub is_deleted: bool,
}

impl Journey {
    /// Builds a live journey from creation input with a fresh id.
    pub fn from_draft(draft: &JourneyDraft) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id: draft.account_id,
            title: draft.title.trim().to_string(),
            location: draft.location.trim().to_string(),
            start: draft.start,
            end: draft.end,
            is_shared: draft.is_shared,
            is_completed: draft.is_completed,
            is_deleted: false,
        }
    }

    pub fn validate(&self) -> Result<(), JourneyValidationError> {
        if self.title.trim().is_empty() {
            return Err(JourneyValidationError::BlankTitle);
        }
        if let Some(end) = self.end {
            if end < self.start {
                return Err(JourneyValidationError::JourneyEndBeforeStart {
                    start: self.start,
                    end,
                });
            }
        }
        Ok(())
    }
}

/// Creation input for a journey that does not exist yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JourneyDraft {
    pub account_id: AccountId,
    pub title: String,
    #[serde(default)]
    pub location: String,
    pub start: DateTime<Utc>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_shared: bool,
    #[serde(default)]
    pub is_completed: bool,
}

/// One civil day of a journey.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JourneyDay {
    pub id: DayId,
    pub journey_id: JourneyId,
    /// Civil midnight, stored as the absolute instant.
    pub date: DateTime<Utc>,
    pub day_number: i64,
    pub is_deleted: bool,
}

impl JourneyDay {
    pub fn new(journey_id: JourneyId, date: DateTime<Utc>, day_number: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            journey_id,
            date,
            day_number,
            is_deleted: false,
        }
    }

    pub fn validate(&self) -> Result<(), JourneyValidationError> {
        if self.day_number < 1 {
            return Err(JourneyValidationError::InvalidDayNumber(self.day_number));
        }
        Ok(())
    }
}

/// One scheduled stop on a journey day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JourneyActivity {
    pub id: ActivityId,
    pub day_id: DayId,
    pub poi_id: PoiId,
    pub activity_type: ActivityType,
    pub time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    /// Creation order within the owning day.
    pub position: i64,
    pub is_deleted: bool,
}

impl JourneyActivity {
    pub fn new(day_id: DayId, poi_id: PoiId, time: DateTime<Utc>, position: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            day_id,
            poi_id,
            activity_type: ActivityType::default(),
            time,
            end_time: None,
            notes: None,
            position,
            is_deleted: false,
        }
    }

    pub fn validate(&self) -> Result<(), JourneyValidationError> {
        if let Some(end_time) = self.end_time {
            if end_time < self.time {
                return Err(JourneyValidationError::ActivityEndBeforeStart {
                    activity_id: self.id,
                    time: self.time,
                    end_time,
                });
            }
        }
        Ok(())
    }
}

/// Read model: one live day with its live activities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelineDay {
    #[serde(flatten)]
    pub day: JourneyDay,
    pub activities: Vec<JourneyActivity>,
}

/// Read model: a journey with its full live subtree in date order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JourneyTimeline {
    pub journey: Journey,
    pub days: Vec<TimelineDay>,
}
