//! Journey repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide create/read/update/soft-delete APIs over `journeys`,
//!   `journey_days` and `journey_activities`.
//! - Keep SQL details inside the persistence boundary.
//!
//! # Invariants
//! - Write paths call the record's `validate()` before SQL mutations.
//! - Default read paths only see live rows; an activity is live only while
//!   its owning day is live.
//! - The repository never opens or commits transactions: it runs on the
//!   connection (or transaction) it was handed, so it always reads its own
//!   writes.

use crate::db::migrations::{current_user_version, latest_version};
use crate::db::DbError;
use crate::model::journey::{
    AccountId, ActivityId, ActivityType, DayId, Journey, JourneyActivity, JourneyDay, JourneyId,
    JourneyValidationError, PoiId,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const JOURNEY_SELECT_SQL: &str = "SELECT
    uuid,
    account_uuid,
    title,
    location,
    start_at,
    end_at,
    is_shared,
    is_completed,
    is_deleted
FROM journeys";

const DAY_SELECT_SQL: &str = "SELECT
    uuid,
    journey_uuid,
    day_date,
    day_number,
    is_deleted
FROM journey_days";

const ACTIVITY_SELECT_SQL: &str = "SELECT
    a.uuid AS uuid,
    a.day_uuid AS day_uuid,
    a.poi_uuid AS poi_uuid,
    a.activity_type AS activity_type,
    a.start_at AS start_at,
    a.end_at AS end_at,
    a.notes AS notes,
    a.position AS position,
    a.is_deleted AS is_deleted
FROM journey_activities a
INNER JOIN journey_days d ON d.uuid = a.day_uuid";

const REQUIRED_TABLES: [&str; 3] = ["journeys", "journey_days", "journey_activities"];

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for journey persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(JourneyValidationError),
    Db(DbError),
    JourneyNotFound(JourneyId),
    DayNotFound(DayId),
    ActivityNotFound(ActivityId),
    /// Connection schema is not at the version this binary expects.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
    /// Persisted row cannot be converted to a valid record.
    InvalidData(String),
}

impl RepoError {
    /// Busy or locked store; every other variant fails again on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Db(err) if err.is_transient())
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::JourneyNotFound(id) => write!(f, "journey not found: {id}"),
            Self::DayNotFound(id) => write!(f, "journey day not found: {id}"),
            Self::ActivityNotFound(id) => write!(f, "journey activity not found: {id}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "journey repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "journey repository requires table `{table}`")
            }
            Self::InvalidData(message) => write!(f, "invalid persisted journey data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<JourneyValidationError> for RepoError {
    fn from(value: JourneyValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Row counts tombstoned by a full subtree wipe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubtreeWipe {
    pub activities: usize,
    pub days: usize,
}

/// Repository interface for the journey → day → activity graph.
pub trait JourneyRepository {
    fn create_journey(&self, journey: &Journey) -> RepoResult<JourneyId>;
    fn get_journey(&self, id: JourneyId, include_deleted: bool) -> RepoResult<Option<Journey>>;
    /// Live journeys of one account ordered by `start`, then id.
    fn list_journeys(&self, account_id: AccountId) -> RepoResult<Vec<Journey>>;
    fn update_journey_window(
        &self,
        id: JourneyId,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    ) -> RepoResult<()>;
    fn soft_delete_journey(&self, id: JourneyId) -> RepoResult<()>;

    fn create_day(&self, day: &JourneyDay) -> RepoResult<DayId>;
    fn get_day(&self, id: DayId) -> RepoResult<Option<JourneyDay>>;
    /// Live days of one journey ordered by date, then day number, then id.
    fn list_live_days(&self, journey_id: JourneyId) -> RepoResult<Vec<JourneyDay>>;
    fn set_day_number(&self, id: DayId, day_number: i64) -> RepoResult<()>;
    fn soft_delete_day(&self, id: DayId) -> RepoResult<()>;
    /// Tombstones every live activity and day of one journey.
    fn soft_delete_journey_subtree(&self, journey_id: JourneyId) -> RepoResult<SubtreeWipe>;

    fn insert_activities(&self, activities: &[JourneyActivity]) -> RepoResult<usize>;
    fn get_activity(&self, id: ActivityId) -> RepoResult<Option<JourneyActivity>>;
    /// Live activities of one live day ordered by time, position, id.
    fn list_day_activities(&self, day_id: DayId) -> RepoResult<Vec<JourneyActivity>>;
    fn next_activity_position(&self, day_id: DayId) -> RepoResult<i64>;
    fn move_activity(
        &self,
        id: ActivityId,
        day_id: DayId,
        time: DateTime<Utc>,
        end_time: Option<DateTime<Utc>>,
    ) -> RepoResult<()>;
    fn update_activity_selection(
        &self,
        id: ActivityId,
        poi_id: PoiId,
        time: DateTime<Utc>,
        end_time: Option<DateTime<Utc>>,
    ) -> RepoResult<()>;
    /// Tombstones every live activity referencing `poi_id` on any live day
    /// of the journey. Returns the number of rows tombstoned.
    fn soft_delete_activities_by_poi(
        &self,
        journey_id: JourneyId,
        poi_id: PoiId,
    ) -> RepoResult<usize>;
}

/// SQLite-backed journey repository.
pub struct SqliteJourneyRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteJourneyRepository<'conn> {
    /// Creates a repository after checking the connection is migrated.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_journey_connection_ready(conn)?;
        Ok(Self { conn })
    }

    /// Creates a repository over a connection already checked by `try_new`.
    ///
    /// Used for per-transaction repositories inside the timeline service.
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl JourneyRepository for SqliteJourneyRepository<'_> {
    fn create_journey(&self, journey: &Journey) -> RepoResult<JourneyId> {
        journey.validate()?;

        self.conn.execute(
            "INSERT INTO journeys (
                uuid,
                account_uuid,
                title,
                location,
                start_at,
                end_at,
                is_shared,
                is_completed,
                is_deleted
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);",
            params![
                journey.id.to_string(),
                journey.account_id.to_string(),
                journey.title.as_str(),
                journey.location.as_str(),
                journey.start.timestamp_millis(),
                journey.end.map(|value| value.timestamp_millis()),
                bool_to_int(journey.is_shared),
                bool_to_int(journey.is_completed),
                bool_to_int(journey.is_deleted),
            ],
        )?;

        Ok(journey.id)
    }

    fn get_journey(&self, id: JourneyId, include_deleted: bool) -> RepoResult<Option<Journey>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "{JOURNEY_SELECT_SQL}
             WHERE uuid = ?1
               AND (?2 = 1 OR is_deleted = 0);"
        ))?;

        let mut rows = stmt.query(params![id.to_string(), bool_to_int(include_deleted)])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_journey_row(row)?));
        }

        Ok(None)
    }

    fn list_journeys(&self, account_id: AccountId) -> RepoResult<Vec<Journey>> {
        let mut stmt = self.conn.prepare(&format!(
            "{JOURNEY_SELECT_SQL}
             WHERE account_uuid = ?1
               AND is_deleted = 0
             ORDER BY start_at ASC, uuid ASC;"
        ))?;

        let mut rows = stmt.query([account_id.to_string()])?;
        let mut journeys = Vec::new();
        while let Some(row) = rows.next()? {
            journeys.push(parse_journey_row(row)?);
        }
        Ok(journeys)
    }

    fn update_journey_window(
        &self,
        id: JourneyId,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    ) -> RepoResult<()> {
        if let Some(end) = end {
            if end < start {
                return Err(JourneyValidationError::JourneyEndBeforeStart { start, end }.into());
            }
        }

        let changed = self.conn.execute(
            "UPDATE journeys
             SET
                start_at = ?2,
                end_at = ?3,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?1
               AND is_deleted = 0;",
            params![
                id.to_string(),
                start.timestamp_millis(),
                end.map(|value| value.timestamp_millis()),
            ],
        )?;

        if changed == 0 {
            return Err(RepoError::JourneyNotFound(id));
        }
        Ok(())
    }

    fn soft_delete_journey(&self, id: JourneyId) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE journeys
             SET
                is_deleted = 1,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?1
               AND is_deleted = 0;",
            [id.to_string()],
        )?;

        if changed == 0 {
            return Err(RepoError::JourneyNotFound(id));
        }
        Ok(())
    }

    fn create_day(&self, day: &JourneyDay) -> RepoResult<DayId> {
        day.validate()?;

        self.conn.execute(
            "INSERT INTO journey_days (
                uuid,
                journey_uuid,
                day_date,
                day_number,
                is_deleted
            ) VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                day.id.to_string(),
                day.journey_id.to_string(),
                day.date.timestamp_millis(),
                day.day_number,
                bool_to_int(day.is_deleted),
            ],
        )?;

        Ok(day.id)
    }

    fn get_day(&self, id: DayId) -> RepoResult<Option<JourneyDay>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "{DAY_SELECT_SQL}
             WHERE uuid = ?1
               AND is_deleted = 0;"
        ))?;

        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_day_row(row)?));
        }
        Ok(None)
    }

    fn list_live_days(&self, journey_id: JourneyId) -> RepoResult<Vec<JourneyDay>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "{DAY_SELECT_SQL}
             WHERE journey_uuid = ?1
               AND is_deleted = 0
             ORDER BY day_date ASC, day_number ASC, uuid ASC;"
        ))?;

        let mut rows = stmt.query([journey_id.to_string()])?;
        let mut days = Vec::new();
        while let Some(row) = rows.next()? {
            days.push(parse_day_row(row)?);
        }
        Ok(days)
    }

    fn set_day_number(&self, id: DayId, day_number: i64) -> RepoResult<()> {
        if day_number < 1 {
            return Err(JourneyValidationError::InvalidDayNumber(day_number).into());
        }

        let changed = self.conn.execute(
            "UPDATE journey_days
             SET
                day_number = ?2,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?1
               AND is_deleted = 0;",
            params![id.to_string(), day_number],
        )?;

        if changed == 0 {
            return Err(RepoError::DayNotFound(id));
        }
        Ok(())
    }

    fn soft_delete_day(&self, id: DayId) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE journey_days
             SET
                is_deleted = 1,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?1
               AND is_deleted = 0;",
            [id.to_string()],
        )?;

        if changed == 0 {
            return Err(RepoError::DayNotFound(id));
        }
        Ok(())
    }

    fn soft_delete_journey_subtree(&self, journey_id: JourneyId) -> RepoResult<SubtreeWipe> {
        let journey_uuid = journey_id.to_string();
        let activities = self.conn.execute(
            "UPDATE journey_activities
             SET
                is_deleted = 1,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE is_deleted = 0
               AND day_uuid IN (
                 SELECT uuid
                 FROM journey_days
                 WHERE journey_uuid = ?1
                   AND is_deleted = 0
               );",
            [journey_uuid.as_str()],
        )?;
        let days = self.conn.execute(
            "UPDATE journey_days
             SET
                is_deleted = 1,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE journey_uuid = ?1
               AND is_deleted = 0;",
            [journey_uuid.as_str()],
        )?;

        Ok(SubtreeWipe { activities, days })
    }

    fn insert_activities(&self, activities: &[JourneyActivity]) -> RepoResult<usize> {
        if activities.is_empty() {
            return Ok(0);
        }

        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO journey_activities (
                uuid,
                day_uuid,
                poi_uuid,
                activity_type,
                start_at,
                end_at,
                notes,
                position,
                is_deleted
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);",
        )?;

        for activity in activities {
            activity.validate()?;
            stmt.execute(params![
                activity.id.to_string(),
                activity.day_id.to_string(),
                activity.poi_id.to_string(),
                activity.activity_type.as_db_str(),
                activity.time.timestamp_millis(),
                activity.end_time.map(|value| value.timestamp_millis()),
                activity.notes.as_deref(),
                activity.position,
                bool_to_int(activity.is_deleted),
            ])?;
        }

        Ok(activities.len())
    }

    fn get_activity(&self, id: ActivityId) -> RepoResult<Option<JourneyActivity>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "{ACTIVITY_SELECT_SQL}
             WHERE a.uuid = ?1
               AND a.is_deleted = 0
               AND d.is_deleted = 0;"
        ))?;

        let mut rows = stmt.query([id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_activity_row(row)?));
        }
        Ok(None)
    }

    fn list_day_activities(&self, day_id: DayId) -> RepoResult<Vec<JourneyActivity>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "{ACTIVITY_SELECT_SQL}
             WHERE a.day_uuid = ?1
               AND a.is_deleted = 0
               AND d.is_deleted = 0
             ORDER BY a.start_at ASC, a.position ASC, a.uuid ASC;"
        ))?;

        let mut rows = stmt.query([day_id.to_string()])?;
        let mut activities = Vec::new();
        while let Some(row) = rows.next()? {
            activities.push(parse_activity_row(row)?);
        }
        Ok(activities)
    }

    fn next_activity_position(&self, day_id: DayId) -> RepoResult<i64> {
        let next = self.conn.query_row(
            "SELECT COALESCE(MAX(position), -1) + 1
             FROM journey_activities
             WHERE day_uuid = ?1
               AND is_deleted = 0;",
            [day_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(next)
    }

    fn move_activity(
        &self,
        id: ActivityId,
        day_id: DayId,
        time: DateTime<Utc>,
        end_time: Option<DateTime<Utc>>,
    ) -> RepoResult<()> {
        ensure_time_range(id, time, end_time)?;

        let changed = self.conn.execute(
            "UPDATE journey_activities
             SET
                day_uuid = ?2,
                start_at = ?3,
                end_at = ?4,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?1
               AND is_deleted = 0;",
            params![
                id.to_string(),
                day_id.to_string(),
                time.timestamp_millis(),
                end_time.map(|value| value.timestamp_millis()),
            ],
        )?;

        if changed == 0 {
            return Err(RepoError::ActivityNotFound(id));
        }
        Ok(())
    }

    fn update_activity_selection(
        &self,
        id: ActivityId,
        poi_id: PoiId,
        time: DateTime<Utc>,
        end_time: Option<DateTime<Utc>>,
    ) -> RepoResult<()> {
        ensure_time_range(id, time, end_time)?;

        let changed = self.conn.execute(
            "UPDATE journey_activities
             SET
                poi_uuid = ?2,
                start_at = ?3,
                end_at = ?4,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?1
               AND is_deleted = 0;",
            params![
                id.to_string(),
                poi_id.to_string(),
                time.timestamp_millis(),
                end_time.map(|value| value.timestamp_millis()),
            ],
        )?;

        if changed == 0 {
            return Err(RepoError::ActivityNotFound(id));
        }
        Ok(())
    }

    fn soft_delete_activities_by_poi(
        &self,
        journey_id: JourneyId,
        poi_id: PoiId,
    ) -> RepoResult<usize> {
        let changed = self.conn.execute(
            "UPDATE journey_activities
             SET
                is_deleted = 1,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE poi_uuid = ?2
               AND is_deleted = 0
               AND day_uuid IN (
                 SELECT uuid
                 FROM journey_days
                 WHERE journey_uuid = ?1
                   AND is_deleted = 0
               );",
            params![journey_id.to_string(), poi_id.to_string()],
        )?;
        Ok(changed)
    }
}

fn ensure_time_range(
    activity_id: ActivityId,
    time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
) -> RepoResult<()> {
    match end_time {
        Some(end_time) if end_time < time => {
            Err(JourneyValidationError::ActivityEndBeforeStart {
                activity_id,
                time,
                end_time,
            }
            .into())
        }
        _ => Ok(()),
    }
}

fn parse_journey_row(row: &Row<'_>) -> RepoResult<Journey> {
    let journey = Journey {
        id: parse_uuid(&row.get::<_, String>("uuid")?, "journeys.uuid")?,
        account_id: parse_uuid(
            &row.get::<_, String>("account_uuid")?,
            "journeys.account_uuid",
        )?,
        title: row.get("title")?,
        location: row.get("location")?,
        start: parse_instant(row.get("start_at")?, "journeys.start_at")?,
        end: row
            .get::<_, Option<i64>>("end_at")?
            .map(|value| parse_instant(value, "journeys.end_at"))
            .transpose()?,
        is_shared: parse_flag(row.get("is_shared")?, "journeys.is_shared")?,
        is_completed: parse_flag(row.get("is_completed")?, "journeys.is_completed")?,
        is_deleted: parse_flag(row.get("is_deleted")?, "journeys.is_deleted")?,
    };
    journey.validate()?;
    Ok(journey)
}

fn parse_day_row(row: &Row<'_>) -> RepoResult<JourneyDay> {
    let day = JourneyDay {
        id: parse_uuid(&row.get::<_, String>("uuid")?, "journey_days.uuid")?,
        journey_id: parse_uuid(
            &row.get::<_, String>("journey_uuid")?,
            "journey_days.journey_uuid",
        )?,
        date: parse_instant(row.get("day_date")?, "journey_days.day_date")?,
        day_number: row.get("day_number")?,
        is_deleted: parse_flag(row.get("is_deleted")?, "journey_days.is_deleted")?,
    };
    day.validate()?;
    Ok(day)
}

fn parse_activity_row(row: &Row<'_>) -> RepoResult<JourneyActivity> {
    let type_text: String = row.get("activity_type")?;
    let activity_type = ActivityType::from_db_str(&type_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid activity type `{type_text}` in journey_activities.activity_type"
        ))
    })?;

    let activity = JourneyActivity {
        id: parse_uuid(&row.get::<_, String>("uuid")?, "journey_activities.uuid")?,
        day_id: parse_uuid(
            &row.get::<_, String>("day_uuid")?,
            "journey_activities.day_uuid",
        )?,
        poi_id: parse_uuid(
            &row.get::<_, String>("poi_uuid")?,
            "journey_activities.poi_uuid",
        )?,
        activity_type,
        time: parse_instant(row.get("start_at")?, "journey_activities.start_at")?,
        end_time: row
            .get::<_, Option<i64>>("end_at")?
            .map(|value| parse_instant(value, "journey_activities.end_at"))
            .transpose()?,
        notes: row.get("notes")?,
        position: row.get("position")?,
        is_deleted: parse_flag(row.get("is_deleted")?, "journey_activities.is_deleted")?,
    };
    activity.validate()?;
    Ok(activity)
}

fn parse_uuid(value: &str, column: &'static str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

fn parse_instant(value: i64, column: &'static str) -> RepoResult<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(value).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid epoch ms `{value}` in {column}"))
    })
}

fn parse_flag(value: i64, column: &'static str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid flag value `{other}` in {column}"
        ))),
    }
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

fn ensure_journey_connection_ready(conn: &Connection) -> RepoResult<()> {
    let expected_version = latest_version();
    let actual_version = current_user_version(conn)?;
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for table in REQUIRED_TABLES {
        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1
                 FROM sqlite_master
                 WHERE type = 'table' AND name = ?1;",
                [table],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(RepoError::MissingRequiredTable(table));
        }
    }

    Ok(())
}
