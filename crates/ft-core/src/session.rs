//! Focus sessions and the snapshots they are built from.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// The focused window as reported by a [`FocusSource`](crate::FocusSource).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSnapshot {
    /// Window-manager class of the focused application.
    pub application_id: String,
    pub window_title: String,
}

impl WindowSnapshot {
    pub fn new(application_id: impl Into<String>, window_title: impl Into<String>) -> Self {
        Self {
            application_id: application_id.into(),
            window_title: window_title.into(),
        }
    }
}

/// One contiguous interval of focus on a single application.
///
/// A session is open while `end_time` is `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivitySession {
    pub application_id: String,
    pub window_title: String,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

impl ActivitySession {
    /// Opens a session at `start_time`.
    pub fn open(
        application_id: impl Into<String>,
        window_title: impl Into<String>,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            application_id: application_id.into(),
            window_title: window_title.into(),
            start_time,
            end_time: None,
        }
    }

    pub const fn is_open(&self) -> bool {
        self.end_time.is_none()
    }

    /// Length of a closed session. Open sessions report zero; use
    /// [`duration_until`](Self::duration_until) for a provisional length.
    pub fn duration(&self) -> Duration {
        self.end_time
            .map_or_else(Duration::zero, |end| end - self.start_time)
    }

    /// Length of the session if it were closed at `now`.
    ///
    /// Closed sessions ignore `now` and report their stored length.
    pub fn duration_until(&self, now: DateTime<Utc>) -> Duration {
        let end = self.end_time.unwrap_or(now);
        (end - self.start_time).max(Duration::zero())
    }

    /// The session as a standalone record, or `None` while it is open.
    pub fn record(&self, ignored: bool) -> Option<SessionRecord> {
        let end_time = self.end_time?;
        Some(SessionRecord {
            application_id: self.application_id.clone(),
            window_title: self.window_title.clone(),
            start_time: self.start_time,
            end_time,
            duration: end_time - self.start_time,
            ignored,
        })
    }
}

/// A closed session, for sinks that keep raw sessions next to summaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub application_id: String,
    pub window_title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(with = "crate::aggregate::duration_ms")]
    pub duration: Duration,
    /// The application was on the ignore list when the record was taken.
    pub ignored: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 31, 10, 0, 0).unwrap()
    }

    #[test]
    fn open_session_has_no_end_and_zero_duration() {
        let session = ActivitySession::open("firefox", "GitHub", t0());
        assert!(session.is_open());
        assert_eq!(session.duration(), Duration::zero());
        assert_eq!(
            session.duration_until(t0() + Duration::seconds(42)),
            Duration::seconds(42)
        );
    }

    #[test]
    fn provisional_duration_never_negative() {
        let session = ActivitySession::open("firefox", "GitHub", t0());
        assert_eq!(
            session.duration_until(t0() - Duration::seconds(5)),
            Duration::zero()
        );
    }

    #[test]
    fn closed_session_ignores_now() {
        let mut session = ActivitySession::open("code", "main.rs", t0());
        session.end_time = Some(t0() + Duration::minutes(3));
        assert!(!session.is_open());
        assert_eq!(session.duration(), Duration::minutes(3));
        assert_eq!(
            session.duration_until(t0() + Duration::hours(1)),
            Duration::minutes(3)
        );
    }

    #[test]
    fn record_requires_a_closed_session() {
        let mut session = ActivitySession::open("steam", "Library", t0());
        assert!(session.record(false).is_none());

        session.end_time = Some(t0() + Duration::seconds(90));
        let record = session.record(true).unwrap();
        assert_eq!(record.duration, Duration::seconds(90));
        assert_eq!(record.end_time, t0() + Duration::seconds(90));
        assert!(record.ignored);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["duration"], 90_000);
        assert_eq!(json["ignored"], true);
    }
}
