//! `ft history`: summaries and sessions recorded by the store sink.

use std::fmt::Write;

use anyhow::Result;
use chrono::{DateTime, Utc};
use ft_core::{ActivitySummary, SessionRecord};
use ft_db::{Database, StoredSession, StoredSummary};
use serde::Serialize;

use super::util::{format_duration, format_local};

const APP_WIDTH: usize = 24;

/// Format stored summaries for human-readable output.
pub fn format_history(rows: &[StoredSummary]) -> String {
    let mut output = String::new();

    if rows.is_empty() {
        output.push_str("No summaries recorded yet.\n\n");
        output.push_str("Hint: set database_path and run 'ft track --submit' to record summaries.\n");
        return output;
    }

    let _ = writeln!(
        output,
        "{:<16}  {:<APP_WIDTH$}  {:>8}  {:>8}  Details",
        "Submitted", "Application", "Duration", "Sessions"
    );
    let _ = writeln!(
        output,
        "────────────────  ────────────────────────  ────────  ────────  ──────────────────"
    );

    for row in rows {
        let summary = &row.summary;
        let app = truncate_app(&summary.application_id);
        let _ = writeln!(
            output,
            "{:<16}  {app:<APP_WIDTH$}  {:>8}  {:>8}  {}",
            format_local(row.submitted_at),
            format_duration(summary.total_duration),
            summary.session_count,
            summary.activity_details
        );
    }
    output
}

// Truncate by characters, not bytes.
fn truncate_app(application_id: &str) -> String {
    if application_id.chars().count() > APP_WIDTH {
        let head: String = application_id.chars().take(APP_WIDTH - 3).collect();
        format!("{head}...")
    } else {
        application_id.to_string()
    }
}

#[derive(Debug, Serialize)]
struct JsonRow<'a> {
    id: i64,
    submitted_at: DateTime<Utc>,
    #[serde(flatten)]
    summary: &'a ActivitySummary,
}

/// Format stored summaries as JSON.
pub fn format_history_json(rows: &[StoredSummary]) -> Result<String> {
    let rows: Vec<JsonRow<'_>> = rows
        .iter()
        .map(|row| JsonRow {
            id: row.id,
            submitted_at: row.submitted_at,
            summary: &row.summary,
        })
        .collect();
    Ok(serde_json::to_string_pretty(&rows)?)
}

/// Runs the history command.
pub fn run(db: &Database, limit: usize, json: bool) -> Result<()> {
    let rows = db.list_recent_summaries(limit)?;
    if json {
        println!("{}", format_history_json(&rows)?);
    } else {
        print!("{}", format_history(&rows));
    }
    Ok(())
}

/// Format stored sessions for human-readable output.
pub fn format_sessions(rows: &[StoredSession]) -> String {
    let mut output = String::new();

    if rows.is_empty() {
        output.push_str("No sessions recorded yet.\n\n");
        output.push_str("Hint: set database_path and run 'ft track --submit' to record sessions.\n");
        return output;
    }

    let _ = writeln!(
        output,
        "{:<16}  {:<APP_WIDTH$}  {:>8}  {:<7}  Window",
        "Started", "Application", "Duration", "Ignored"
    );
    let _ = writeln!(
        output,
        "────────────────  ────────────────────────  ────────  ───────  ──────────────────"
    );

    for row in rows {
        let session = &row.session;
        let _ = writeln!(
            output,
            "{:<16}  {:<APP_WIDTH$}  {:>8}  {:<7}  {}",
            format_local(session.start_time),
            truncate_app(&session.application_id),
            format_duration(session.duration),
            if session.ignored { "yes" } else { "no" },
            session.window_title
        );
    }
    output
}

#[derive(Debug, Serialize)]
struct JsonSessionRow<'a> {
    id: i64,
    recorded_at: DateTime<Utc>,
    #[serde(flatten)]
    session: &'a SessionRecord,
}

/// Format stored sessions as JSON.
pub fn format_sessions_json(rows: &[StoredSession]) -> Result<String> {
    let rows: Vec<JsonSessionRow<'_>> = rows
        .iter()
        .map(|row| JsonSessionRow {
            id: row.id,
            recorded_at: row.recorded_at,
            session: &row.session,
        })
        .collect();
    Ok(serde_json::to_string_pretty(&rows)?)
}

/// Runs the history command for sessions.
pub fn run_sessions(db: &Database, limit: usize, json: bool) -> Result<()> {
    let rows = db.list_recent_sessions(limit)?;
    if json {
        println!("{}", format_sessions_json(&rows)?);
    } else {
        print!("{}", format_sessions(&rows));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{Duration, TimeZone};

    fn stored(id: i64, app: &str, minutes: i64) -> StoredSummary {
        let first = Utc.with_ymd_and_hms(2025, 10, 31, 9, 0, 0).unwrap();
        StoredSummary {
            id,
            summary: ActivitySummary {
                application_id: app.to_string(),
                activity_details: format!("{app} window"),
                total_duration: Duration::minutes(minutes),
                session_count: 2,
                first_seen: first,
                last_seen: first + Duration::minutes(minutes),
            },
            submitted_at: first + Duration::hours(1),
        }
    }

    #[test]
    fn empty_history_has_hint() {
        let output = format_history(&[]);
        assert!(output.starts_with("No summaries recorded yet."));
    }

    #[test]
    fn rows_are_rendered() {
        let output = format_history(&[
            stored(2, "code", 95),
            stored(1, "an.application.with.a.very.long.id", 6),
        ]);
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[2].contains("code"));
        assert!(lines[2].contains("1h 35m"));
        assert!(lines[2].ends_with("code window"));
        assert!(lines[3].contains("an.application.with.a..."));
    }

    #[test]
    fn json_flattens_summary() {
        let json = format_history_json(&[stored(7, "code", 30)]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        insta::assert_json_snapshot!(value, @r#"
        [
          {
            "activity_details": "code window",
            "application_id": "code",
            "first_seen": "2025-10-31T09:00:00Z",
            "id": 7,
            "last_seen": "2025-10-31T09:30:00Z",
            "session_count": 2,
            "submitted_at": "2025-10-31T10:00:00Z",
            "total_duration": 1800000
          }
        ]
        "#);
    }

    #[test]
    fn run_reads_from_database() {
        let mut db = Database::open_in_memory().unwrap();
        db.insert_summary(&stored(0, "code", 30).summary, Utc::now())
            .unwrap();
        run(&db, 10, true).unwrap();
        run(&db, 10, false).unwrap();
    }

    fn stored_session(id: i64, app: &str, ignored: bool) -> StoredSession {
        let start = Utc.with_ymd_and_hms(2025, 10, 31, 9, 0, 0).unwrap();
        StoredSession {
            id,
            session: SessionRecord {
                application_id: app.to_string(),
                window_title: format!("{app} window"),
                start_time: start,
                end_time: start + Duration::minutes(12),
                duration: Duration::minutes(12),
                ignored,
            },
            recorded_at: start + Duration::hours(1),
        }
    }

    #[test]
    fn empty_sessions_have_hint() {
        assert!(format_sessions(&[]).starts_with("No sessions recorded yet."));
    }

    #[test]
    fn session_rows_show_ignored_flag() {
        let output = format_sessions(&[
            stored_session(2, "steam", true),
            stored_session(1, "code", false),
        ]);
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[2].contains("steam"));
        assert!(lines[2].contains("12m"));
        assert!(lines[2].contains(" yes "));
        assert!(lines[2].ends_with("steam window"));
        assert!(lines[3].contains(" no "));
    }

    #[test]
    fn sessions_json_flattens_record() {
        let json = format_sessions_json(&[stored_session(3, "steam", true)]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        insta::assert_json_snapshot!(value, @r#"
        [
          {
            "application_id": "steam",
            "duration": 720000,
            "end_time": "2025-10-31T09:12:00Z",
            "id": 3,
            "ignored": true,
            "recorded_at": "2025-10-31T10:00:00Z",
            "start_time": "2025-10-31T09:00:00Z",
            "window_title": "steam window"
          }
        ]
        "#);
    }

    #[test]
    fn run_sessions_reads_from_database() {
        let mut db = Database::open_in_memory().unwrap();
        db.insert_sessions(&[stored_session(0, "code", false).session], Utc::now())
            .unwrap();
        run_sessions(&db, 10, true).unwrap();
        run_sessions(&db, 10, false).unwrap();
    }
}
