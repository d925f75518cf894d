//! Plan skeleton produced by the itinerary planner.
//!
//! The skeleton is untrusted input: POI references and clock times are kept
//! as raw strings here and resolved (or skipped) by the materializer.

use crate::model::journey::ActivityType;
use serde::{Deserialize, Serialize};

/// Ordered day blocks; block `i` (0-based) lands on `base_date + i`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSkeleton {
    #[serde(default)]
    pub days: Vec<PlanDayBlock>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanDayBlock {
    #[serde(default)]
    pub activities: Vec<PlanActivityBlock>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanActivityBlock {
    /// Raw POI identifier; empty or malformed values make the block skipped.
    #[serde(default)]
    pub poi_id: String,
    /// Clock time such as `09:00`; midnight when absent or unparsable.
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    /// Activity tag such as `food`; unknown tags fall back to `place`.
    #[serde(default)]
    pub activity_type: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl PlanActivityBlock {
    pub fn resolved_activity_type(&self) -> ActivityType {
        self.activity_type
            .as_deref()
            .map(|tag| tag.trim().to_ascii_lowercase())
            .and_then(|tag| ActivityType::from_db_str(&tag))
            .unwrap_or_default()
    }
}

impl PlanSkeleton {
    pub fn day_count(&self) -> usize {
        self.days.len()
    }

    pub fn activity_block_count(&self) -> usize {
        self.days.iter().map(|day| day.activities.len()).sum()
    }
}
