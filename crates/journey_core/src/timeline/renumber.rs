//! Dense day renumbering.
//!
//! After any day-count change, live days ordered by date (then id) must
//! carry `day_number` 1..N. Only drifted rows are written.

use crate::model::journey::{DayId, JourneyDay, JourneyId};
use crate::repo::journey_repo::JourneyRepository;
use crate::timeline::TimelineResult;

/// One day whose number drifted from its chronological position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayNumberPatch {
    pub day_id: DayId,
    pub from: i64,
    pub to: i64,
}

/// Computes the minimal set of day-number writes for `days`.
pub fn plan_renumbering(days: &[JourneyDay]) -> Vec<DayNumberPatch> {
    let mut ordered: Vec<&JourneyDay> = days.iter().filter(|day| !day.is_deleted).collect();
    ordered.sort_by_key(|day| (day.date, day.id));

    ordered
        .into_iter()
        .zip(1_i64..)
        .filter(|(day, expected)| day.day_number != *expected)
        .map(|(day, expected)| DayNumberPatch {
            day_id: day.id,
            from: day.day_number,
            to: expected,
        })
        .collect()
}

/// Re-derives day numbers for one journey and writes drifted rows.
///
/// Returns the patches applied, empty when the sequence was already dense.
pub fn renumber_days<R: JourneyRepository>(
    repo: &R,
    journey_id: JourneyId,
) -> TimelineResult<Vec<DayNumberPatch>> {
    let days = repo.list_live_days(journey_id)?;
    let patches = plan_renumbering(&days);
    for patch in &patches {
        repo.set_day_number(patch.day_id, patch.to)?;
    }
    Ok(patches)
}
