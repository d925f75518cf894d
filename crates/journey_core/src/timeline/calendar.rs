//! Civil calendar normalization.
//!
//! # Responsibility
//! - Project absolute instants onto civil dates and clock times in one
//!   configured IANA timezone.
//! - Build absolute instants back from a civil date and a clock time.
//!
//! # Invariants
//! - Every day-bucketing comparison in the engine goes through
//!   [`CivilCalendar::civil_date`]; dates are compared, never raw instants.
//! - Local times inside a DST gap resolve forward using the pre-gap offset.
//! - Ambiguous local times (DST fold) resolve to the earlier instant.

use chrono::{
    DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc,
};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;

/// Timezone used when configuration does not name one.
pub const DEFAULT_TIMEZONE: &str = "Asia/Ho_Chi_Minh";

static CLOCK_TIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,2}):(\d{2})(?::(\d{2}))?\s*([AaPp][Mm])?$")
        .expect("valid clock time regex")
});

/// Day-bucketing calendar bound to a single timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CivilCalendar {
    tz: Tz,
}

impl Default for CivilCalendar {
    fn default() -> Self {
        Self {
            tz: chrono_tz::Asia::Ho_Chi_Minh,
        }
    }
}

impl CivilCalendar {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    /// Resolves an IANA name such as `Europe/Berlin`.
    pub fn from_iana_name(name: &str) -> Option<Self> {
        name.trim().parse::<Tz>().ok().map(Self::new)
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Civil date of `instant` in this calendar's timezone.
    pub fn civil_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.tz).date_naive()
    }

    /// Civil clock time of `instant` in this calendar's timezone.
    pub fn clock_time(&self, instant: DateTime<Utc>) -> NaiveTime {
        instant.with_timezone(&self.tz).time()
    }

    /// Start of the civil day containing `instant`.
    pub fn civil_midnight(&self, instant: DateTime<Utc>) -> DateTime<Tz> {
        self.midnight_of(self.civil_date(instant))
    }

    /// Start of the given civil day.
    pub fn midnight_of(&self, date: NaiveDate) -> DateTime<Tz> {
        self.combine(date, NaiveTime::default())
    }

    /// Absolute instant of `time` on civil `date`.
    pub fn combine(&self, date: NaiveDate, time: NaiveTime) -> DateTime<Tz> {
        let local = date.and_time(time);
        match self.tz.from_local_datetime(&local) {
            LocalResult::Single(instant) => instant,
            LocalResult::Ambiguous(earliest, _) => earliest,
            LocalResult::None => self.resolve_gap(local),
        }
    }

    /// `date` shifted by `days` civil days, `None` past chrono's date range.
    pub fn shift_days(date: NaiveDate, days: i64) -> Option<NaiveDate> {
        date.checked_add_signed(Duration::days(days))
    }

    /// Parses a clock-time string from planner output.
    ///
    /// Accepts `H:MM`, `HH:MM`, `HH:MM:SS`, optionally followed by `AM`/`PM`.
    /// Returns `None` for anything else, including out-of-range fields.
    pub fn parse_clock_time(value: &str) -> Option<NaiveTime> {
        let caps = CLOCK_TIME_RE.captures(value.trim())?;
        let mut hour: u32 = caps.get(1)?.as_str().parse().ok()?;
        let minute: u32 = caps.get(2)?.as_str().parse().ok()?;
        let second: u32 = match caps.get(3) {
            Some(value) => value.as_str().parse().ok()?,
            None => 0,
        };

        if let Some(meridiem) = caps.get(4) {
            if !(1..=12).contains(&hour) {
                return None;
            }
            let is_pm = meridiem.as_str().eq_ignore_ascii_case("pm");
            hour = match (hour, is_pm) {
                (12, false) => 0,
                (12, true) => 12,
                (value, true) => value + 12,
                (value, false) => value,
            };
        }

        NaiveTime::from_hms_opt(hour, minute, second)
    }

    fn resolve_gap(&self, local: NaiveDateTime) -> DateTime<Tz> {
        // Offset in force a day earlier is the one before the transition.
        let day_before = local - Duration::days(1);
        let offset = self.tz.offset_from_utc_datetime(&day_before).fix();
        let utc = local - Duration::seconds(i64::from(offset.local_minus_utc()));
        self.tz.from_utc_datetime(&utc)
    }
}
