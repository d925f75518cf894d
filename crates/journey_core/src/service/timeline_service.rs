//! Journey timeline use-case service.
//!
//! # Responsibility
//! - Expose timeline operations (materialize, rescale, add day, add/remove/
//!   update activity) plus journey create/read/delete to controllers.
//! - Own every transaction boundary: one immediate transaction per call,
//!   committed on success and rolled back on any failure.
//! - Translate engine and storage failures into [`TimelineServiceError`].
//!
//! # Invariants
//! - After any successful call, a journey's live days cover distinct civil
//!   dates and carry day numbers `1..N` in date order.
//! - Precondition failures detectable from the arguments alone are rejected
//!   before a transaction opens.
//!
//! # Concurrency
//! Immediate transactions take SQLite's write lock up front, so two calls
//! on the same journey never observe the same "before" day set.

use crate::model::journey::{
    AccountId, ActivityId, ActivityType, DayId, Journey, JourneyActivity, JourneyDay,
    JourneyDraft, JourneyId, JourneyTimeline, JourneyValidationError, PoiId, TimelineDay,
};
use crate::model::plan::PlanSkeleton;
use crate::repo::journey_repo::{JourneyRepository, RepoError, SqliteJourneyRepository};
use crate::timeline::calendar::CivilCalendar;
use crate::timeline::materialize::{materialize_plan, MaterializeOutcome};
use crate::timeline::reanchor::{apply_activity_moves, plan_activity_moves};
use crate::timeline::reconcile::{reconcile_days, DayReconciliation};
use crate::timeline::renumber::renumber_days;
use crate::timeline::TimelineError;
use chrono::{DateTime, NaiveDate, Utc};
use log::{error, info, warn};
use rusqlite::{Connection, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Failure class used by controllers to pick a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad client input; retrying unchanged will fail again.
    Precondition,
    /// Referenced journey, day or activity does not exist or is deleted.
    NotFound,
    /// Store failure; the whole operation was rolled back. Only lock
    /// contention is worth retrying, see [`TimelineServiceError::is_retryable`].
    Storage,
}

/// Errors from timeline service operations.
#[derive(Debug)]
pub enum TimelineServiceError {
    MissingCreationInput,
    EmptyWindow {
        start: NaiveDate,
        end: NaiveDate,
    },
    /// `add_day` on a journey with no live day to extend from.
    NoAnchorDay(JourneyId),
    NoSurvivingDays {
        orphaned: usize,
    },
    DateOutOfRange(NaiveDate),
    InvalidTimeRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    /// Activity's day does not match the civil date of the requested start.
    DayDateMismatch {
        activity_id: ActivityId,
        day_date: NaiveDate,
        requested: NaiveDate,
    },
    Validation(JourneyValidationError),
    JourneyNotFound(JourneyId),
    DayNotFound {
        journey_id: JourneyId,
        date: NaiveDate,
    },
    ActivityNotFound(ActivityId),
    Storage(RepoError),
}

impl TimelineServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::JourneyNotFound(_) | Self::DayNotFound { .. } | Self::ActivityNotFound(_) => {
                ErrorKind::NotFound
            }
            Self::Storage(_) => ErrorKind::Storage,
            _ => ErrorKind::Precondition,
        }
    }

    /// True only for busy or locked stores. Schema mismatches and corrupt
    /// rows are storage failures too, but fail again on every retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(err) if err.is_transient())
    }

    fn code(&self) -> &'static str {
        match self {
            Self::MissingCreationInput => "missing_creation_input",
            Self::EmptyWindow { .. } => "empty_window",
            Self::NoAnchorDay(_) => "no_anchor_day",
            Self::NoSurvivingDays { .. } => "no_surviving_days",
            Self::DateOutOfRange(_) => "date_out_of_range",
            Self::InvalidTimeRange { .. } => "invalid_time_range",
            Self::DayDateMismatch { .. } => "day_date_mismatch",
            Self::Validation(_) => "validation_failed",
            Self::JourneyNotFound(_) => "journey_not_found",
            Self::DayNotFound { .. } => "day_not_found",
            Self::ActivityNotFound(_) => "activity_not_found",
            Self::Storage(_) => "storage_failed",
        }
    }
}

impl Display for TimelineServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingCreationInput => {
                write!(f, "journey creation input is required when no journey id is given")
            }
            Self::EmptyWindow { start, end } => {
                write!(f, "journey window is empty: {start} .. {end}")
            }
            Self::NoAnchorDay(id) => write!(f, "journey {id} has no day to extend from"),
            Self::NoSurvivingDays { orphaned } => write!(
                f,
                "no surviving day to re-anchor activities of {orphaned} removed day(s)"
            ),
            Self::DateOutOfRange(date) => write!(f, "date out of supported range near {date}"),
            Self::InvalidTimeRange { start, end } => {
                write!(f, "activity end {end} is before start {start}")
            }
            Self::DayDateMismatch {
                activity_id,
                day_date,
                requested,
            } => write!(
                f,
                "activity {activity_id} belongs to {day_date}, not {requested}"
            ),
            Self::Validation(err) => write!(f, "{err}"),
            Self::JourneyNotFound(id) => write!(f, "journey not found: {id}"),
            Self::DayNotFound { journey_id, date } => {
                write!(f, "journey {journey_id} has no day on {date}")
            }
            Self::ActivityNotFound(id) => write!(f, "journey activity not found: {id}"),
            Self::Storage(err) => write!(f, "{err}"),
        }
    }
}

impl Error for TimelineServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for TimelineServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::JourneyNotFound(id) => Self::JourneyNotFound(id),
            RepoError::ActivityNotFound(id) => Self::ActivityNotFound(id),
            RepoError::Validation(err) => Self::Validation(err),
            other => Self::Storage(other),
        }
    }
}

impl From<rusqlite::Error> for TimelineServiceError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Storage(value.into())
    }
}

impl From<TimelineError> for TimelineServiceError {
    fn from(value: TimelineError) -> Self {
        match value {
            TimelineError::EmptyWindow { start, end } => Self::EmptyWindow { start, end },
            TimelineError::NoSurvivingDays { orphaned } => Self::NoSurvivingDays { orphaned },
            TimelineError::MissingSurvivingDay(_) => Self::NoSurvivingDays { orphaned: 0 },
            TimelineError::MissingCreationInput => Self::MissingCreationInput,
            TimelineError::JourneyNotFound(id) => Self::JourneyNotFound(id),
            TimelineError::DateOutOfRange(date) => Self::DateOutOfRange(date),
            TimelineError::Repo(err) => err.into(),
        }
    }
}

/// Counts describing one window rescale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RescaleOutcome {
    pub days_added: usize,
    pub days_removed: usize,
    pub activities_moved: usize,
    pub days_renumbered: usize,
}

/// Input for adding one activity to an existing day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewActivity {
    pub poi_id: PoiId,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub activity_type: ActivityType,
    pub notes: Option<String>,
}

impl NewActivity {
    pub fn new(poi_id: PoiId, start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> Self {
        Self {
            poi_id,
            start,
            end,
            activity_type: ActivityType::default(),
            notes: None,
        }
    }
}

type ServiceResult<T> = Result<T, TimelineServiceError>;

/// Journey timeline service facade over one SQLite connection.
pub struct JourneyTimelineService<'conn> {
    conn: &'conn mut Connection,
    calendar: CivilCalendar,
}

impl<'conn> JourneyTimelineService<'conn> {
    /// Creates the service after checking the connection is migrated.
    pub fn try_new(conn: &'conn mut Connection, calendar: CivilCalendar) -> ServiceResult<Self> {
        SqliteJourneyRepository::try_new(conn).map_err(TimelineServiceError::Storage)?;
        Ok(Self { conn, calendar })
    }

    /// Creates a journey with one live day per civil date of its window.
    pub fn create_journey(&mut self, draft: &JourneyDraft) -> ServiceResult<JourneyId> {
        let journey = Journey::from_draft(draft);
        journey.validate().map_err(TimelineServiceError::Validation)?;

        self.write("create_journey", |repo, calendar| {
            repo.create_journey(&journey)?;
            let start_date = calendar.civil_date(journey.start);
            let end_date = calendar.civil_date(journey.end.unwrap_or(journey.start));
            apply_window(repo, calendar, journey.id, start_date, end_date)?;
            Ok(journey.id)
        })
    }

    /// Replaces a journey's whole subtree with `skeleton`, creating the
    /// journey from `draft` when no id is given.
    pub fn materialize_plan(
        &mut self,
        journey_id: Option<JourneyId>,
        skeleton: &PlanSkeleton,
        draft: Option<&JourneyDraft>,
    ) -> ServiceResult<JourneyId> {
        if journey_id.is_none() && draft.is_none() {
            return Err(TimelineServiceError::MissingCreationInput);
        }

        let outcome: MaterializeOutcome = self.write("materialize_plan", |repo, calendar| {
            Ok(materialize_plan(repo, calendar, journey_id, skeleton, draft)?)
        })?;

        info!(
            "event=plan_materialized module=timeline journey_id={} created={} days={} activities={} skipped={} removed_days={} removed_activities={}",
            outcome.journey_id,
            outcome.journey_created,
            outcome.days_created,
            outcome.activities_created,
            outcome.activity_blocks_skipped,
            outcome.days_removed,
            outcome.activities_removed
        );
        Ok(outcome.journey_id)
    }

    /// Moves the journey window to `[new_start, new_end]`, reconciling days
    /// and re-anchoring activities of removed days.
    pub fn rescale_window(
        &mut self,
        journey_id: JourneyId,
        new_start: DateTime<Utc>,
        new_end: DateTime<Utc>,
    ) -> ServiceResult<RescaleOutcome> {
        // Only civil dates decide the day set; instants on one date may come
        // in either order.
        let start_date = self.calendar.civil_date(new_start);
        let end_date = self.calendar.civil_date(new_end);
        if end_date < start_date {
            return Err(TimelineServiceError::EmptyWindow {
                start: start_date,
                end: end_date,
            });
        }
        let stored_end = new_end.max(new_start);

        let outcome = self.write("rescale_window", |repo, calendar| {
            require_journey(repo, journey_id)?;
            let outcome = apply_window(repo, calendar, journey_id, start_date, end_date)?;
            repo.update_journey_window(journey_id, new_start, Some(stored_end))?;
            Ok(outcome)
        })?;

        info!(
            "event=window_rescaled module=timeline journey_id={} days_added={} days_removed={} activities_moved={} days_renumbered={}",
            journey_id,
            outcome.days_added,
            outcome.days_removed,
            outcome.activities_moved,
            outcome.days_renumbered
        );
        Ok(outcome)
    }

    /// Appends one civil day after the journey's latest live day.
    ///
    /// Fails with [`TimelineServiceError::NoAnchorDay`] on a journey with
    /// no live days.
    pub fn add_day(&mut self, journey_id: JourneyId) -> ServiceResult<DayId> {
        self.write("add_day", |repo, calendar| {
            let journey = require_journey(repo, journey_id)?;
            let days = repo.list_live_days(journey_id)?;
            let last_date = days
                .iter()
                .map(|day| calendar.civil_date(day.date))
                .max()
                .ok_or(TimelineServiceError::NoAnchorDay(journey_id))?;
            let max_number = days.iter().map(|day| day.day_number).max().unwrap_or(0);

            let new_date = CivilCalendar::shift_days(last_date, 1)
                .ok_or(TimelineServiceError::DateOutOfRange(last_date))?;
            let day = JourneyDay::new(
                journey_id,
                calendar.midnight_of(new_date).with_timezone(&Utc),
                max_number + 1,
            );
            repo.create_day(&day)?;

            if let Some(end) = journey.end {
                if calendar.civil_date(end) < new_date {
                    let extended = calendar
                        .combine(new_date, calendar.clock_time(end))
                        .with_timezone(&Utc);
                    repo.update_journey_window(journey_id, journey.start, Some(extended))?;
                }
            }
            Ok(day.id)
        })
    }

    /// Adds one activity on the live day matching the civil date of
    /// `activity.start`.
    pub fn add_activity(
        &mut self,
        journey_id: JourneyId,
        activity: &NewActivity,
    ) -> ServiceResult<ActivityId> {
        ensure_time_range(activity.start, activity.end)?;

        self.write("add_activity", |repo, calendar| {
            require_journey(repo, journey_id)?;
            let date = calendar.civil_date(activity.start);
            let day = repo
                .list_live_days(journey_id)?
                .into_iter()
                .find(|day| calendar.civil_date(day.date) == date)
                .ok_or(TimelineServiceError::DayNotFound { journey_id, date })?;

            let position = repo.next_activity_position(day.id)?;
            let mut record =
                JourneyActivity::new(day.id, activity.poi_id, activity.start, position);
            record.end_time = activity.end;
            record.activity_type = activity.activity_type;
            record.notes = activity.notes.clone();
            repo.insert_activities(std::slice::from_ref(&record))?;
            Ok(record.id)
        })
    }

    /// Removes every live activity referencing `poi_id` across the whole
    /// journey. Returns the number removed.
    pub fn remove_activity(
        &mut self,
        journey_id: JourneyId,
        poi_id: PoiId,
    ) -> ServiceResult<usize> {
        self.write("remove_activity", |repo, _| {
            require_journey(repo, journey_id)?;
            Ok(repo.soft_delete_activities_by_poi(journey_id, poi_id)?)
        })
    }

    /// Replaces the POI and times of one activity, which must stay on the
    /// civil date of its current day.
    pub fn update_activity_selection(
        &mut self,
        activity_id: ActivityId,
        poi_id: PoiId,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    ) -> ServiceResult<()> {
        ensure_time_range(start, end)?;

        self.write("update_activity_selection", |repo, calendar| {
            let activity = repo
                .get_activity(activity_id)?
                .ok_or(TimelineServiceError::ActivityNotFound(activity_id))?;
            let day = repo
                .get_day(activity.day_id)?
                .ok_or(TimelineServiceError::ActivityNotFound(activity_id))?;

            let day_date = calendar.civil_date(day.date);
            let requested = calendar.civil_date(start);
            if day_date != requested {
                return Err(TimelineServiceError::DayDateMismatch {
                    activity_id,
                    day_date,
                    requested,
                });
            }

            repo.update_activity_selection(activity_id, poi_id, start, end)?;
            Ok(())
        })
    }

    /// Loads a journey with its live days and activities in timeline order.
    pub fn journey_timeline(&mut self, journey_id: JourneyId) -> ServiceResult<JourneyTimeline> {
        self.read("journey_timeline", |repo, _| {
            let journey = require_journey(repo, journey_id)?;
            let mut days = Vec::new();
            for day in repo.list_live_days(journey_id)? {
                let activities = repo.list_day_activities(day.id)?;
                days.push(TimelineDay { day, activities });
            }
            Ok(JourneyTimeline { journey, days })
        })
    }

    /// Lists live journeys owned by `account_id`.
    pub fn list_journeys(&mut self, account_id: AccountId) -> ServiceResult<Vec<Journey>> {
        self.read("list_journeys", |repo, _| Ok(repo.list_journeys(account_id)?))
    }

    /// Soft-deletes a journey together with its whole live subtree.
    pub fn delete_journey(&mut self, journey_id: JourneyId) -> ServiceResult<()> {
        self.write("delete_journey", |repo, _| {
            require_journey(repo, journey_id)?;
            repo.soft_delete_journey_subtree(journey_id)?;
            repo.soft_delete_journey(journey_id)?;
            Ok(())
        })
    }

    fn write<T, F>(&mut self, operation: &'static str, work: F) -> ServiceResult<T>
    where
        F: FnOnce(&SqliteJourneyRepository<'_>, &CivilCalendar) -> ServiceResult<T>,
    {
        self.run_in_transaction(operation, TransactionBehavior::Immediate, work)
    }

    fn read<T, F>(&mut self, operation: &'static str, work: F) -> ServiceResult<T>
    where
        F: FnOnce(&SqliteJourneyRepository<'_>, &CivilCalendar) -> ServiceResult<T>,
    {
        self.run_in_transaction(operation, TransactionBehavior::Deferred, work)
    }

    fn run_in_transaction<T, F>(
        &mut self,
        operation: &'static str,
        behavior: TransactionBehavior,
        work: F,
    ) -> ServiceResult<T>
    where
        F: FnOnce(&SqliteJourneyRepository<'_>, &CivilCalendar) -> ServiceResult<T>,
    {
        let started_at = Instant::now();
        let result = self
            .conn
            .transaction_with_behavior(behavior)
            .map_err(TimelineServiceError::from)
            .and_then(|tx| {
                let value = work(&SqliteJourneyRepository::new(&tx), &self.calendar)?;
                tx.commit()?;
                Ok(value)
            });

        match &result {
            Ok(_) => info!(
                "event=timeline_op module=service op={operation} status=ok duration_ms={}",
                started_at.elapsed().as_millis()
            ),
            Err(err) if err.kind() == ErrorKind::Storage => error!(
                "event=timeline_op module=service op={operation} status=error duration_ms={} error_code={} error={}",
                started_at.elapsed().as_millis(),
                err.code(),
                err
            ),
            Err(err) => warn!(
                "event=timeline_op module=service op={operation} status=rejected duration_ms={} error_code={}",
                started_at.elapsed().as_millis(),
                err.code()
            ),
        }
        result
    }
}

fn require_journey<R: JourneyRepository>(
    repo: &R,
    journey_id: JourneyId,
) -> ServiceResult<Journey> {
    repo.get_journey(journey_id, false)?
        .ok_or(TimelineServiceError::JourneyNotFound(journey_id))
}

fn ensure_time_range(start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> ServiceResult<()> {
    match end {
        Some(end) if end < start => Err(TimelineServiceError::InvalidTimeRange { start, end }),
        _ => Ok(()),
    }
}

/// Reconcile → re-anchor → remove orphans → renumber for one journey.
fn apply_window<R: JourneyRepository>(
    repo: &R,
    calendar: &CivilCalendar,
    journey_id: JourneyId,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> ServiceResult<RescaleOutcome> {
    let existing = repo.list_live_days(journey_id)?;
    let plan = reconcile_days(calendar, &existing, start_date, end_date)?;

    let activities_moved = if plan.is_noop() {
        0
    } else {
        apply_day_diff(repo, calendar, journey_id, start_date, &plan)?
    };
    let patches = renumber_days(repo, journey_id)?;

    Ok(RescaleOutcome {
        days_added: plan.dates_to_create.len(),
        days_removed: plan.orphaned_days.len(),
        activities_moved,
        days_renumbered: patches.len(),
    })
}

/// Creates missing days, moves orphan activities and tombstones orphans.
/// Returns the number of activities moved.
fn apply_day_diff<R: JourneyRepository>(
    repo: &R,
    calendar: &CivilCalendar,
    journey_id: JourneyId,
    start_date: NaiveDate,
    plan: &DayReconciliation,
) -> ServiceResult<usize> {
    let mut surviving = plan.surviving_days.clone();
    for date in &plan.dates_to_create {
        // Position in the window is the final number unless survivors drift.
        let day_number = (*date - start_date).num_days() + 1;
        let day = JourneyDay::new(
            journey_id,
            calendar.midnight_of(*date).with_timezone(&Utc),
            day_number,
        );
        repo.create_day(&day)?;
        surviving.insert(*date, day.id);
    }

    let mut orphans = Vec::with_capacity(plan.orphaned_days.len());
    for day in &plan.orphaned_days {
        orphans.push((day.clone(), repo.list_day_activities(day.id)?));
    }
    let moves = plan_activity_moves(calendar, &orphans, &plan.reanchor_targets, &surviving)?;
    let activities_moved = apply_activity_moves(repo, &moves)?;

    for day in &plan.orphaned_days {
        repo.soft_delete_day(day.id)?;
    }
    Ok(activities_moved)
}
