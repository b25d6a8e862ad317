//! Per-application aggregation of focus sessions.
//!
//! Summaries are recomputed on every call and keyed by application
//! identifier in a [`BTreeMap`], so iteration order is stable.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::session::ActivitySession;

/// Aggregated time spent in one application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivitySummary {
    pub application_id: String,
    /// Window title of the most recently ended session.
    pub activity_details: String,
    #[serde(with = "duration_ms")]
    pub total_duration: Duration,
    pub session_count: u32,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl ActivitySummary {
    fn start(session: &ActivitySession, end: DateTime<Utc>) -> Self {
        Self {
            application_id: session.application_id.clone(),
            activity_details: session.window_title.clone(),
            total_duration: Duration::zero(),
            session_count: 0,
            first_seen: session.start_time,
            last_seen: end,
        }
    }
}

/// Summaries keyed by application identifier.
pub type Summaries = BTreeMap<String, ActivitySummary>;

/// Folds closed sessions and the optional open session into summaries.
///
/// The open session is treated as if it ended at `now` and always supplies
/// the summary's `activity_details` and `last_seen`.
pub fn summarize(
    closed: &[ActivitySession],
    open: Option<&ActivitySession>,
    now: DateTime<Utc>,
) -> Summaries {
    let mut summaries = Summaries::new();

    for session in closed {
        let end = session.end_time.unwrap_or(now);
        let summary = summaries
            .entry(session.application_id.clone())
            .or_insert_with(|| ActivitySummary::start(session, end));

        summary.total_duration += session.duration_until(now);
        summary.session_count += 1;
        if session.start_time < summary.first_seen {
            summary.first_seen = session.start_time;
        }
        // Ties keep the earlier title: only a strictly later end wins.
        if end > summary.last_seen {
            summary.last_seen = end;
            summary.activity_details.clone_from(&session.window_title);
        }
    }

    if let Some(session) = open {
        let summary = summaries
            .entry(session.application_id.clone())
            .or_insert_with(|| ActivitySummary::start(session, now));

        summary.total_duration += session.duration_until(now);
        summary.session_count += 1;
        if session.start_time < summary.first_seen {
            summary.first_seen = session.start_time;
        }
        summary.last_seen = now;
        summary.activity_details.clone_from(&session.window_title);
    }

    summaries
}

/// Serializes a [`Duration`] as whole milliseconds.
pub mod duration_ms {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(value.num_milliseconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        i64::deserialize(deserializer).map(Duration::milliseconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 31, 10, 0, 0).unwrap()
    }

    fn closed(app: &str, title: &str, start_s: i64, end_s: i64) -> ActivitySession {
        ActivitySession {
            application_id: app.to_string(),
            window_title: title.to_string(),
            start_time: t0() + Duration::seconds(start_s),
            end_time: Some(t0() + Duration::seconds(end_s)),
        }
    }

    #[test]
    fn empty_input_yields_no_summaries() {
        assert!(summarize(&[], None, t0()).is_empty());
    }

    #[test]
    fn accumulates_per_application() {
        let sessions = vec![
            closed("firefox", "GitHub", 0, 60),
            closed("code", "main.rs", 60, 180),
            closed("firefox", "Docs", 180, 300),
        ];
        let summaries = summarize(&sessions, None, t0() + Duration::seconds(400));

        assert_eq!(summaries.len(), 2);
        let firefox = &summaries["firefox"];
        assert_eq!(firefox.total_duration, Duration::seconds(180));
        assert_eq!(firefox.session_count, 2);
        assert_eq!(firefox.first_seen, t0());
        assert_eq!(firefox.last_seen, t0() + Duration::seconds(300));
        assert_eq!(firefox.activity_details, "Docs");

        let code = &summaries["code"];
        assert_eq!(code.total_duration, Duration::seconds(120));
        assert_eq!(code.session_count, 1);
    }

    #[test]
    fn title_comes_from_most_recently_ended_session() {
        // Listed out of chronological order: the later-ending one must win.
        let sessions = vec![
            closed("firefox", "Later", 100, 200),
            closed("firefox", "Earlier", 0, 50),
        ];
        let summaries = summarize(&sessions, None, t0() + Duration::seconds(300));
        let firefox = &summaries["firefox"];
        assert_eq!(firefox.activity_details, "Later");
        assert_eq!(firefox.first_seen, t0());
        assert_eq!(firefox.last_seen, t0() + Duration::seconds(200));
    }

    #[test]
    fn open_session_overrides_details_and_last_seen() {
        let sessions = vec![closed("firefox", "GitHub", 0, 60)];
        let open = ActivitySession::open("firefox", "Live tab", t0() + Duration::seconds(100));
        let now = t0() + Duration::seconds(160);

        let summaries = summarize(&sessions, Some(&open), now);
        let firefox = &summaries["firefox"];
        assert_eq!(firefox.total_duration, Duration::seconds(120));
        assert_eq!(firefox.session_count, 2);
        assert_eq!(firefox.activity_details, "Live tab");
        assert_eq!(firefox.last_seen, now);
        assert_eq!(firefox.first_seen, t0());
    }

    #[test]
    fn open_session_alone_creates_summary() {
        let open = ActivitySession::open("slack", "general", t0());
        let summaries = summarize(&[], Some(&open), t0() + Duration::seconds(30));
        let slack = &summaries["slack"];
        assert_eq!(slack.total_duration, Duration::seconds(30));
        assert_eq!(slack.session_count, 1);
        assert_eq!(slack.first_seen, t0());
    }

    #[test]
    fn conserves_duration_and_count() {
        let sessions: Vec<_> = (0..20)
            .map(|i| {
                let app = ["a", "b", "c"][i % 3];
                let start = i64::try_from(i).unwrap() * 100;
                closed(app, "t", start, start + 15 + start % 7)
            })
            .collect();
        let summaries = summarize(&sessions, None, t0() + Duration::hours(1));

        let total: Duration = summaries.values().map(|s| s.total_duration).sum();
        let expected: Duration = sessions.iter().map(ActivitySession::duration).sum();
        assert_eq!(total, expected);

        let count: u32 = summaries.values().map(|s| s.session_count).sum();
        assert_eq!(count as usize, sessions.len());
    }

    #[test]
    fn summaries_iterate_in_application_order() {
        let sessions = vec![
            closed("zoom", "call", 0, 20),
            closed("alacritty", "shell", 20, 40),
            closed("firefox", "GitHub", 40, 60),
        ];
        let keys: Vec<_> = summarize(&sessions, None, t0())
            .into_keys()
            .collect();
        assert_eq!(keys, vec!["alacritty", "firefox", "zoom"]);
    }

    #[test]
    fn summary_serializes_duration_as_milliseconds() {
        let sessions = vec![closed("code", "lib.rs", 0, 90)];
        let summaries = summarize(&sessions, None, t0());
        let json = serde_json::to_value(&summaries["code"]).unwrap();
        assert_eq!(json["total_duration"], 90_000);
        let back: ActivitySummary = serde_json::from_value(json).unwrap();
        assert_eq!(back, summaries["code"]);
    }
}
