//! Re-anchoring of activities owned by days removed during reconciliation.
//!
//! # Invariants
//! - Civil clock time is preserved; only the civil date changes.
//! - An end time that crossed midnight keeps its day offset from the start.
//! - Activity type, notes, POI reference and position are never touched.
//! - Activities from several orphans landing on one date are merged without
//!   collision checks.

use crate::model::journey::{ActivityId, DayId, JourneyActivity, JourneyDay};
use crate::repo::journey_repo::JourneyRepository;
use crate::timeline::calendar::CivilCalendar;
use crate::timeline::{TimelineError, TimelineResult};
use chrono::{DateTime, NaiveDate, Utc};
use log::debug;
use std::collections::BTreeMap;

/// One planned activity relocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityMove {
    pub activity_id: ActivityId,
    pub from_day_id: DayId,
    pub to_day_id: DayId,
    pub time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

/// Computes moves for every activity of every orphaned day.
///
/// `reanchor_targets` maps each orphan day to its nearest surviving date and
/// `surviving` maps each surviving date to its live day row.
pub fn plan_activity_moves(
    calendar: &CivilCalendar,
    orphans: &[(JourneyDay, Vec<JourneyActivity>)],
    reanchor_targets: &BTreeMap<DayId, NaiveDate>,
    surviving: &BTreeMap<NaiveDate, DayId>,
) -> TimelineResult<Vec<ActivityMove>> {
    let mut moves = Vec::new();
    for (day, activities) in orphans {
        if activities.is_empty() {
            continue;
        }
        let target_date = *reanchor_targets
            .get(&day.id)
            .ok_or(TimelineError::NoSurvivingDays {
                orphaned: orphans.len(),
            })?;
        let to_day_id = *surviving
            .get(&target_date)
            .ok_or(TimelineError::MissingSurvivingDay(target_date))?;

        for activity in activities {
            let (time, end_time) = reanchor_times(calendar, activity, target_date)?;
            moves.push(ActivityMove {
                activity_id: activity.id,
                from_day_id: day.id,
                to_day_id,
                time,
                end_time,
            });
        }
    }
    Ok(moves)
}

/// Writes planned moves through the repository. Returns the move count.
pub fn apply_activity_moves<R: JourneyRepository>(
    repo: &R,
    moves: &[ActivityMove],
) -> TimelineResult<usize> {
    for planned in moves {
        debug!(
            "event=activity_reanchored module=timeline activity_id={} from_day_id={} to_day_id={}",
            planned.activity_id, planned.from_day_id, planned.to_day_id
        );
        repo.move_activity(
            planned.activity_id,
            planned.to_day_id,
            planned.time,
            planned.end_time,
        )?;
    }
    Ok(moves.len())
}

fn reanchor_times(
    calendar: &CivilCalendar,
    activity: &JourneyActivity,
    target_date: NaiveDate,
) -> TimelineResult<(DateTime<Utc>, Option<DateTime<Utc>>)> {
    let start_date = calendar.civil_date(activity.time);
    let time = calendar
        .combine(target_date, calendar.clock_time(activity.time))
        .with_timezone(&Utc);

    let end_time = match activity.end_time {
        Some(end) => {
            let offset_days = (calendar.civil_date(end) - start_date).num_days();
            let end_date = CivilCalendar::shift_days(target_date, offset_days)
                .ok_or(TimelineError::DateOutOfRange(target_date))?;
            let moved = calendar
                .combine(end_date, calendar.clock_time(end))
                .with_timezone(&Utc);
            // A DST gap on the new date can pull a same-clock end before its start.
            Some(moved.max(time))
        }
        None => None,
    };

    Ok((time, end_time))
}
