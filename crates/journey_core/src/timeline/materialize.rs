//! Plan materialization: full replacement of a journey's day/activity
//! subtree from a plan skeleton.
//!
//! # Invariants
//! - The prior subtree is tombstoned wholesale; nothing is diffed or kept.
//! - Day block `i` (1-based) lands on `civil_date(journey.start) + (i - 1)`
//!   with `day_number = i`.
//! - Activity blocks with an empty or malformed POI reference are skipped;
//!   sibling blocks are still created.
//! - Missing or unparsable start clock times default to the day's midnight.
//! - An end clock time earlier than the start crosses midnight onto the
//!   next civil day.

use crate::model::journey::{
    DayId, Journey, JourneyActivity, JourneyDay, JourneyDraft, JourneyId,
};
use crate::model::plan::{PlanActivityBlock, PlanSkeleton};
use crate::repo::journey_repo::JourneyRepository;
use crate::timeline::calendar::CivilCalendar;
use crate::timeline::{TimelineError, TimelineResult};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use log::debug;
use uuid::Uuid;

/// Counts describing one materialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaterializeOutcome {
    pub journey_id: JourneyId,
    pub journey_created: bool,
    pub days_created: usize,
    pub activities_created: usize,
    pub activity_blocks_skipped: usize,
    pub days_removed: usize,
    pub activities_removed: usize,
}

/// Replaces the subtree of `journey_id` (or of a journey created from
/// `draft`) with the contents of `skeleton`.
///
/// Must run inside the caller's transaction; partial writes on error are
/// the caller's to roll back.
pub fn materialize_plan<R: JourneyRepository>(
    repo: &R,
    calendar: &CivilCalendar,
    journey_id: Option<JourneyId>,
    skeleton: &PlanSkeleton,
    draft: Option<&JourneyDraft>,
) -> TimelineResult<MaterializeOutcome> {
    let (journey, journey_created) = resolve_journey(repo, calendar, journey_id, skeleton, draft)?;
    let base_date = calendar.civil_date(journey.start);
    debug!(
        "event=plan_materialize_start module=timeline journey_id={} day_blocks={} activity_blocks={}",
        journey.id,
        skeleton.day_count(),
        skeleton.activity_block_count()
    );

    let wiped = repo.soft_delete_journey_subtree(journey.id)?;

    let mut outcome = MaterializeOutcome {
        journey_id: journey.id,
        journey_created,
        days_created: 0,
        activities_created: 0,
        activity_blocks_skipped: 0,
        days_removed: wiped.days,
        activities_removed: wiped.activities,
    };

    for (index, block) in skeleton.days.iter().enumerate() {
        let date = CivilCalendar::shift_days(base_date, index as i64)
            .ok_or(TimelineError::DateOutOfRange(base_date))?;
        let day = JourneyDay::new(
            journey.id,
            calendar.midnight_of(date).with_timezone(&Utc),
            index as i64 + 1,
        );
        repo.create_day(&day)?;
        outcome.days_created += 1;

        let mut activities = Vec::with_capacity(block.activities.len());
        for activity_block in &block.activities {
            let position = activities.len() as i64;
            match build_activity(calendar, day.id, date, activity_block, position)? {
                Some(activity) => activities.push(activity),
                None => {
                    debug!(
                        "event=plan_block_skipped module=timeline journey_id={} day_number={} reason=invalid_poi",
                        journey.id, day.day_number
                    );
                    outcome.activity_blocks_skipped += 1;
                }
            }
        }
        outcome.activities_created += repo.insert_activities(&activities)?;
    }

    Ok(outcome)
}

/// End instant derived from `start` spanning `day_count` civil days.
pub fn derive_window_end(
    calendar: &CivilCalendar,
    start: DateTime<Utc>,
    day_count: usize,
) -> TimelineResult<DateTime<Utc>> {
    let start_date = calendar.civil_date(start);
    let span = day_count.saturating_sub(1) as i64;
    let end_date = CivilCalendar::shift_days(start_date, span)
        .ok_or(TimelineError::DateOutOfRange(start_date))?;
    Ok(calendar
        .combine(end_date, calendar.clock_time(start))
        .with_timezone(&Utc))
}

fn resolve_journey<R: JourneyRepository>(
    repo: &R,
    calendar: &CivilCalendar,
    journey_id: Option<JourneyId>,
    skeleton: &PlanSkeleton,
    draft: Option<&JourneyDraft>,
) -> TimelineResult<(Journey, bool)> {
    match journey_id {
        Some(id) => {
            let mut journey = repo
                .get_journey(id, false)?
                .ok_or(TimelineError::JourneyNotFound(id))?;
            if skeleton.day_count() > 0 {
                let end = derive_window_end(calendar, journey.start, skeleton.day_count())?;
                repo.update_journey_window(journey.id, journey.start, Some(end))?;
                journey.end = Some(end);
            }
            Ok((journey, false))
        }
        None => {
            let draft = draft.ok_or(TimelineError::MissingCreationInput)?;
            let mut journey = Journey::from_draft(draft);
            if journey.end.is_none() {
                journey.end = Some(derive_window_end(
                    calendar,
                    journey.start,
                    skeleton.day_count(),
                )?);
            }
            repo.create_journey(&journey)?;
            Ok((journey, true))
        }
    }
}

fn build_activity(
    calendar: &CivilCalendar,
    day_id: DayId,
    date: NaiveDate,
    block: &PlanActivityBlock,
    position: i64,
) -> TimelineResult<Option<JourneyActivity>> {
    let Ok(poi_id) = Uuid::parse_str(block.poi_id.trim()) else {
        return Ok(None);
    };
    if poi_id.is_nil() {
        return Ok(None);
    }

    let start_clock = block
        .start_time
        .as_deref()
        .and_then(CivilCalendar::parse_clock_time)
        .unwrap_or_default();
    let time = calendar.combine(date, start_clock).with_timezone(&Utc);

    let end_time = match block
        .end_time
        .as_deref()
        .and_then(CivilCalendar::parse_clock_time)
    {
        Some(end_clock) => Some(end_instant(calendar, date, start_clock, end_clock, time)?),
        None => None,
    };

    let mut activity = JourneyActivity::new(day_id, poi_id, time, position);
    activity.activity_type = block.resolved_activity_type();
    activity.end_time = end_time;
    activity.notes = block
        .notes
        .as_deref()
        .map(str::trim)
        .filter(|notes| !notes.is_empty())
        .map(str::to_string);
    Ok(Some(activity))
}

fn end_instant(
    calendar: &CivilCalendar,
    date: NaiveDate,
    start_clock: NaiveTime,
    end_clock: NaiveTime,
    start: DateTime<Utc>,
) -> TimelineResult<DateTime<Utc>> {
    let end_date = if end_clock < start_clock {
        CivilCalendar::shift_days(date, 1).ok_or(TimelineError::DateOutOfRange(date))?
    } else {
        date
    };
    let end = calendar.combine(end_date, end_clock).with_timezone(&Utc);
    Ok(end.max(start))
}
