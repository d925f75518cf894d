//! Day-set reconciliation between a journey's live days and a target window.
//!
//! # Invariants
//! - The target set is every civil date of `[start, end]` inclusive.
//! - At most one existing day is kept per civil date; the earliest by
//!   `(day_number, id)` wins and any duplicate is treated as orphaned.
//! - Each orphan maps to the nearest date of the post-reconciliation target
//!   set. Equidistant candidates resolve to the earlier date.

use crate::model::journey::{DayId, JourneyDay};
use crate::timeline::calendar::CivilCalendar;
use crate::timeline::{TimelineError, TimelineResult};
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};

/// Outcome of reconciling existing days against a target window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayReconciliation {
    /// Target dates with no existing live day, ascending.
    pub dates_to_create: Vec<NaiveDate>,
    /// Existing days that keep their row, keyed by civil date.
    pub surviving_days: BTreeMap<NaiveDate, DayId>,
    /// Existing days outside the target window (or duplicates of a kept date).
    pub orphaned_days: Vec<JourneyDay>,
    /// Orphaned day id → nearest surviving civil date.
    pub reanchor_targets: BTreeMap<DayId, NaiveDate>,
}

impl DayReconciliation {
    /// True when the window already matches the live days exactly.
    pub fn is_noop(&self) -> bool {
        self.dates_to_create.is_empty() && self.orphaned_days.is_empty()
    }
}

/// Lists every civil date from `start` to `end` inclusive.
pub fn enumerate_dates(start: NaiveDate, end: NaiveDate) -> TimelineResult<Vec<NaiveDate>> {
    if end < start {
        return Err(TimelineError::EmptyWindow { start, end });
    }
    Ok(start.iter_days().take_while(|date| *date <= end).collect())
}

/// Diffs `existing` live days against the civil window `[start, end]`.
pub fn reconcile_days(
    calendar: &CivilCalendar,
    existing: &[JourneyDay],
    start: NaiveDate,
    end: NaiveDate,
) -> TimelineResult<DayReconciliation> {
    let target_dates = enumerate_dates(start, end)?;
    let target_set: BTreeSet<NaiveDate> = target_dates.iter().copied().collect();

    let mut ordered: Vec<&JourneyDay> = existing.iter().collect();
    ordered.sort_by_key(|day| (calendar.civil_date(day.date), day.day_number, day.id));

    let mut surviving_days = BTreeMap::new();
    let mut orphaned = Vec::new();
    for day in ordered {
        let date = calendar.civil_date(day.date);
        if target_set.contains(&date) && !surviving_days.contains_key(&date) {
            surviving_days.insert(date, day.id);
        } else {
            orphaned.push((date, day.clone()));
        }
    }

    let dates_to_create: Vec<NaiveDate> = target_dates
        .iter()
        .copied()
        .filter(|date| !surviving_days.contains_key(date))
        .collect();

    let mut reanchor_targets = BTreeMap::new();
    for (date, day) in &orphaned {
        let nearest = nearest_surviving_date(&target_set, *date).ok_or(
            TimelineError::NoSurvivingDays {
                orphaned: orphaned.len(),
            },
        )?;
        reanchor_targets.insert(day.id, nearest);
    }

    Ok(DayReconciliation {
        dates_to_create,
        surviving_days,
        orphaned_days: orphaned.into_iter().map(|(_, day)| day).collect(),
        reanchor_targets,
    })
}

/// Nearest member of `surviving` to `date` by absolute day distance.
///
/// Ties prefer the earlier date. Returns `date` itself when it survives and
/// `None` only when `surviving` is empty.
pub fn nearest_surviving_date(
    surviving: &BTreeSet<NaiveDate>,
    date: NaiveDate,
) -> Option<NaiveDate> {
    let before = surviving.range(..=date).next_back().copied();
    let after = surviving.range(date..).next().copied();
    match (before, after) {
        (Some(before), Some(after)) => {
            if date - before <= after - date {
                Some(before)
            } else {
                Some(after)
            }
        }
        (Some(before), None) => Some(before),
        (None, after) => after,
    }
}
