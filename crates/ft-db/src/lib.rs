//! Storage layer for submitted activity summaries and sessions.
//!
//! Provides persistence for [`ActivitySummary`] and [`SessionRecord`] rows
//! using `rusqlite`.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! Share it across tasks behind a `Mutex<Database>`.
//!
//! # Schema
//!
//! Timestamps are stored as TEXT in RFC 3339 format with millisecond precision
//! (e.g., `2025-10-31T10:30:00.000Z`), so lexicographic order matches
//! chronological order. Durations are stored as INTEGER milliseconds.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use ft_core::{ActivitySummary, SessionRecord};
use rusqlite::{Connection, ErrorCode, params};
use thiserror::Error;

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Failed to create the directory holding the database file.
    #[error("failed to create database directory {path}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Failed to parse a stored timestamp.
    #[error("invalid timestamp in row {id}: {timestamp}")]
    TimestampParse {
        id: i64,
        timestamp: String,
        #[source]
        source: chrono::ParseError,
    },
}

impl DbError {
    /// Whether the database was busy or locked by another connection.
    pub fn is_busy(&self) -> bool {
        match self {
            Self::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

/// A summary row as read back from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSummary {
    pub id: i64,
    pub summary: ActivitySummary,
    pub submitted_at: DateTime<Utc>,
}

/// A session row as read back from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSession {
    pub id: i64,
    pub session: SessionRecord,
    pub recorded_at: DateTime<Utc>,
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| DbError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        tracing::debug!(path = %path.display(), "opened summary store");
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS activity_summaries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                application_id TEXT NOT NULL,
                activity_details TEXT NOT NULL,
                total_duration_ms INTEGER NOT NULL CHECK (total_duration_ms >= 0),
                session_count INTEGER NOT NULL CHECK (session_count > 0),
                first_seen TEXT NOT NULL,
                last_seen TEXT NOT NULL,
                submitted_at TEXT NOT NULL,
                CHECK (last_seen >= first_seen)
            );

            CREATE INDEX IF NOT EXISTS idx_summaries_application ON activity_summaries(application_id);
            CREATE INDEX IF NOT EXISTS idx_summaries_first_seen ON activity_summaries(first_seen);
            CREATE INDEX IF NOT EXISTS idx_summaries_submitted_at ON activity_summaries(submitted_at);

            CREATE TABLE IF NOT EXISTS activity_sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                application_id TEXT NOT NULL,
                window_title TEXT NOT NULL,
                start_time TEXT NOT NULL,
                end_time TEXT NOT NULL,
                duration_ms INTEGER NOT NULL CHECK (duration_ms >= 0),
                ignored INTEGER NOT NULL DEFAULT 0 CHECK (ignored IN (0, 1)),
                recorded_at TEXT NOT NULL,
                CHECK (end_time >= start_time)
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_application ON activity_sessions(application_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_start_time ON activity_sessions(start_time);
            ",
        )?;
        Ok(())
    }

    /// Inserts one summary and returns its row ID.
    pub fn insert_summary(
        &mut self,
        summary: &ActivitySummary,
        submitted_at: DateTime<Utc>,
    ) -> Result<i64, DbError> {
        self.conn.execute(
            "
            INSERT INTO activity_summaries (
                application_id, activity_details, total_duration_ms,
                session_count, first_seen, last_seen, submitted_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ",
            params![
                summary.application_id,
                summary.activity_details,
                summary.total_duration.num_milliseconds(),
                summary.session_count,
                format_timestamp(summary.first_seen),
                format_timestamp(summary.last_seen),
                format_timestamp(submitted_at),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Inserts a batch of summaries in one transaction.
    pub fn insert_summaries(
        &mut self,
        summaries: &[ActivitySummary],
        submitted_at: DateTime<Utc>,
    ) -> Result<usize, DbError> {
        if summaries.is_empty() {
            return Ok(0);
        }
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "
                INSERT INTO activity_summaries (
                    application_id, activity_details, total_duration_ms,
                    session_count, first_seen, last_seen, submitted_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ",
            )?;
            let submitted_at = format_timestamp(submitted_at);
            for summary in summaries {
                stmt.execute(params![
                    summary.application_id,
                    summary.activity_details,
                    summary.total_duration.num_milliseconds(),
                    summary.session_count,
                    format_timestamp(summary.first_seen),
                    format_timestamp(summary.last_seen),
                    submitted_at,
                ])?;
            }
        }
        tx.commit()?;
        Ok(summaries.len())
    }

    /// Lists the most recently submitted summaries, newest first.
    pub fn list_recent_summaries(&self, limit: usize) -> Result<Vec<StoredSummary>, DbError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = self.conn.prepare(
            "
            SELECT id, application_id, activity_details, total_duration_ms,
                   session_count, first_seen, last_seen, submitted_at
            FROM activity_summaries
            ORDER BY submitted_at DESC, id DESC
            LIMIT ?1
            ",
        )?;
        let rows = stmt.query_map([limit], |row| {
            Ok(RawSummary {
                id: row.get(0)?,
                application_id: row.get(1)?,
                activity_details: row.get(2)?,
                total_duration_ms: row.get(3)?,
                session_count: row.get(4)?,
                first_seen: row.get(5)?,
                last_seen: row.get(6)?,
                submitted_at: row.get(7)?,
            })
        })?;
        let mut summaries = Vec::new();
        for row in rows {
            summaries.push(row?.into_stored()?);
        }
        Ok(summaries)
    }

    /// Number of stored summary rows.
    pub fn count_summaries(&self) -> Result<usize, DbError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM activity_summaries", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Inserts a batch of session records in one transaction.
    pub fn insert_sessions(
        &mut self,
        sessions: &[SessionRecord],
        recorded_at: DateTime<Utc>,
    ) -> Result<usize, DbError> {
        if sessions.is_empty() {
            return Ok(0);
        }
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "
                INSERT INTO activity_sessions (
                    application_id, window_title, start_time, end_time,
                    duration_ms, ignored, recorded_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ",
            )?;
            let recorded_at = format_timestamp(recorded_at);
            for session in sessions {
                stmt.execute(params![
                    session.application_id,
                    session.window_title,
                    format_timestamp(session.start_time),
                    format_timestamp(session.end_time),
                    session.duration.num_milliseconds(),
                    session.ignored,
                    recorded_at,
                ])?;
            }
        }
        tx.commit()?;
        Ok(sessions.len())
    }

    /// Lists the most recent sessions by start time, newest first.
    pub fn list_recent_sessions(&self, limit: usize) -> Result<Vec<StoredSession>, DbError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = self.conn.prepare(
            "
            SELECT id, application_id, window_title, start_time, end_time,
                   duration_ms, ignored, recorded_at
            FROM activity_sessions
            ORDER BY start_time DESC, id DESC
            LIMIT ?1
            ",
        )?;
        let rows = stmt.query_map([limit], |row| {
            Ok(RawSession {
                id: row.get(0)?,
                application_id: row.get(1)?,
                window_title: row.get(2)?,
                start_time: row.get(3)?,
                end_time: row.get(4)?,
                duration_ms: row.get(5)?,
                ignored: row.get(6)?,
                recorded_at: row.get(7)?,
            })
        })?;
        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(row?.into_stored()?);
        }
        Ok(sessions)
    }

    /// Number of stored session rows.
    pub fn count_sessions(&self) -> Result<usize, DbError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM activity_sessions", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

struct RawSession {
    id: i64,
    application_id: String,
    window_title: String,
    start_time: String,
    end_time: String,
    duration_ms: i64,
    ignored: bool,
    recorded_at: String,
}

impl RawSession {
    fn into_stored(self) -> Result<StoredSession, DbError> {
        Ok(StoredSession {
            id: self.id,
            session: SessionRecord {
                application_id: self.application_id,
                window_title: self.window_title,
                start_time: parse_timestamp(&self.start_time, self.id)?,
                end_time: parse_timestamp(&self.end_time, self.id)?,
                duration: Duration::milliseconds(self.duration_ms),
                ignored: self.ignored,
            },
            recorded_at: parse_timestamp(&self.recorded_at, self.id)?,
        })
    }
}

struct RawSummary {
    id: i64,
    application_id: String,
    activity_details: String,
    total_duration_ms: i64,
    session_count: u32,
    first_seen: String,
    last_seen: String,
    submitted_at: String,
}

impl RawSummary {
    fn into_stored(self) -> Result<StoredSummary, DbError> {
        let first_seen = parse_timestamp(&self.first_seen, self.id)?;
        let last_seen = parse_timestamp(&self.last_seen, self.id)?;
        let submitted_at = parse_timestamp(&self.submitted_at, self.id)?;
        Ok(StoredSummary {
            id: self.id,
            summary: ActivitySummary {
                application_id: self.application_id,
                activity_details: self.activity_details,
                total_duration: Duration::milliseconds(self.total_duration_ms),
                session_count: self.session_count,
                first_seen,
                last_seen,
            },
            submitted_at,
        })
    }
}

fn parse_timestamp(timestamp: &str, id: i64) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|source| DbError::TimestampParse {
            id,
            timestamp: timestamp.to_string(),
            source,
        })
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 31, 9, 0, 0).unwrap()
    }

    fn summary(app: &str, minutes: i64) -> ActivitySummary {
        ActivitySummary {
            application_id: app.to_string(),
            activity_details: format!("{app} window"),
            total_duration: Duration::minutes(minutes),
            session_count: 2,
            first_seen: t0(),
            last_seen: t0() + Duration::minutes(minutes),
        }
    }

    fn table_columns(conn: &Connection, table: &str) -> Vec<String> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info({table})"))
            .expect("prepare table_info");
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .expect("query table_info");
        rows.map(|row| row.expect("table_info row")).collect()
    }

    #[test]
    fn open_in_memory_database() {
        let db = Database::open_in_memory();
        assert!(db.is_ok());
    }

    #[test]
    fn schema_matches_data_model() {
        let db = Database::open_in_memory().expect("open in-memory db");
        assert_eq!(
            table_columns(&db.conn, "activity_summaries"),
            vec![
                "id",
                "application_id",
                "activity_details",
                "total_duration_ms",
                "session_count",
                "first_seen",
                "last_seen",
                "submitted_at",
            ]
        );
    }

    #[test]
    fn insert_and_read_back() {
        let mut db = Database::open_in_memory().unwrap();
        let s = summary("firefox", 42);
        let id = db.insert_summary(&s, t0() + Duration::hours(1)).unwrap();

        let stored = db.list_recent_summaries(10).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, id);
        assert_eq!(stored[0].summary, s);
        assert_eq!(stored[0].submitted_at, t0() + Duration::hours(1));
    }

    #[test]
    fn recent_summaries_are_newest_first_and_limited() {
        let mut db = Database::open_in_memory().unwrap();
        db.insert_summaries(&[summary("a", 5), summary("b", 6)], t0())
            .unwrap();
        db.insert_summary(&summary("c", 7), t0() + Duration::minutes(15))
            .unwrap();

        let apps: Vec<_> = db
            .list_recent_summaries(2)
            .unwrap()
            .into_iter()
            .map(|s| s.summary.application_id)
            .collect();
        assert_eq!(apps, vec!["c", "b"]);
        assert_eq!(db.count_summaries().unwrap(), 3);
    }

    #[test]
    fn empty_batch_is_noop() {
        let mut db = Database::open_in_memory().unwrap();
        assert_eq!(db.insert_summaries(&[], t0()).unwrap(), 0);
        assert_eq!(db.count_summaries().unwrap(), 0);
    }

    #[test]
    fn check_constraints_reject_inconsistent_rows() {
        let mut db = Database::open_in_memory().unwrap();
        let mut s = summary("a", 5);
        s.session_count = 0;
        let err = db.insert_summary(&s, t0()).unwrap_err();
        assert!(matches!(err, DbError::Sqlite(_)));
        assert!(!err.is_busy());
    }

    #[test]
    fn file_database_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("ft.db");
        {
            let mut db = Database::open(&path).unwrap();
            db.insert_summary(&summary("code", 30), t0()).unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.count_summaries().unwrap(), 1);
    }

    #[test]
    fn corrupt_timestamp_is_reported() {
        let db = Database::open_in_memory().unwrap();
        db.conn
            .execute(
                "INSERT INTO activity_summaries (application_id, activity_details, total_duration_ms, session_count, first_seen, last_seen, submitted_at)
                 VALUES ('a', '', 1000, 1, 'bogus', 'bogus', 'bogus')",
                [],
            )
            .unwrap();
        let err = db.list_recent_summaries(1).unwrap_err();
        assert!(matches!(err, DbError::TimestampParse { .. }));
    }

    fn session(app: &str, start_min: i64, minutes: i64, ignored: bool) -> SessionRecord {
        let start = t0() + Duration::minutes(start_min);
        SessionRecord {
            application_id: app.to_string(),
            window_title: format!("{app} window"),
            start_time: start,
            end_time: start + Duration::minutes(minutes),
            duration: Duration::minutes(minutes),
            ignored,
        }
    }

    #[test]
    fn sessions_table_matches_data_model() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(
            table_columns(&db.conn, "activity_sessions"),
            vec![
                "id",
                "application_id",
                "window_title",
                "start_time",
                "end_time",
                "duration_ms",
                "ignored",
                "recorded_at",
            ]
        );
    }

    #[test]
    fn sessions_read_back_newest_first() {
        let mut db = Database::open_in_memory().unwrap();
        let sessions = vec![session("code", 0, 20, false), session("steam", 30, 5, true)];
        assert_eq!(db.insert_sessions(&sessions, t0() + Duration::hours(1)).unwrap(), 2);
        assert_eq!(db.insert_sessions(&[], t0()).unwrap(), 0);

        let stored = db.list_recent_sessions(10).unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].session, sessions[1]);
        assert_eq!(stored[1].session, sessions[0]);
        assert_eq!(stored[0].recorded_at, t0() + Duration::hours(1));
        assert_eq!(db.count_sessions().unwrap(), 2);
        assert_eq!(db.list_recent_sessions(1).unwrap().len(), 1);
    }

    #[test]
    fn failed_session_batch_rolls_back() {
        let mut db = Database::open_in_memory().unwrap();
        let mut reversed = session("zoom", 10, 5, false);
        reversed.end_time = reversed.start_time - Duration::minutes(1);

        let err = db
            .insert_sessions(&[session("code", 0, 5, false), reversed], t0())
            .unwrap_err();
        assert!(matches!(err, DbError::Sqlite(_)));
        assert_eq!(db.count_sessions().unwrap(), 0);
    }
}
