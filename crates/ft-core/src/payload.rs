//! Outbound payload shapes and their validation.
//!
//! The time-tracking API accepts two request bodies: the legacy offline-time
//! entry ([`LegacyPayload`]) and the native client event ([`NativeEvent`]).
//! Other sinks only need [`validate_summary`].

use std::fmt::Display;

use chrono::{DateTime, Duration, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::aggregate::ActivitySummary;
use crate::session::SessionRecord;

/// Largest legacy entry the API accepts, in minutes (inclusive).
pub const MAX_LEGACY_MINUTES: i64 = 240;

/// Time format of legacy `start_time` / `end_time` fields.
pub const LEGACY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Reasons an outbound payload or summary is rejected before sending.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("application identifier is required")]
    MissingApplication,
    #[error("duration must be positive, got {0}")]
    NonPositiveDuration(i64),
    #[error("duration exceeds limit of {limit} minutes: {minutes} minutes")]
    DurationExceedsLimit { minutes: i64, limit: i64 },
    #[error("invalid start_time (expected YYYY-MM-DD HH:MM:SS): {0:?}")]
    InvalidStartTime(String),
    #[error("invalid end_time: {0:?}")]
    InvalidEndTime(String),
    #[error("end_time must be after start_time")]
    EndNotAfterStart,
    #[error("duration and end_time are mutually exclusive")]
    DurationAndEndTime,
    #[error("either duration or end_time must be provided")]
    MissingDurationOrEndTime,
    #[error("session_count must be positive")]
    NoSessions,
    #[error("last_seen is before first_seen")]
    LastSeenBeforeFirstSeen,
    #[error("end_time is before start_time")]
    EndBeforeStart,
    #[error("duration does not match start_time and end_time")]
    DurationMismatch,
}

/// Legacy offline-time entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyPayload {
    /// Local wall-clock start, `YYYY-MM-DD HH:MM:SS`.
    pub start_time: String,
    /// Whole minutes, rounded up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    pub activity_name: String,
    pub activity_details: String,
}

impl LegacyPayload {
    /// Builds an entry with the start in the local time zone.
    pub fn from_summary(summary: &ActivitySummary) -> Self {
        Self::from_summary_in(summary, &Local)
    }

    /// Builds an entry with the start rendered in `tz`.
    pub fn from_summary_in<Tz>(summary: &ActivitySummary, tz: &Tz) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        Self {
            start_time: summary
                .first_seen
                .with_timezone(tz)
                .format(LEGACY_TIME_FORMAT)
                .to_string(),
            duration: Some(ceil_minutes(summary.total_duration)),
            end_time: None,
            activity_name: summary.application_id.clone(),
            activity_details: summary.activity_details.clone(),
        }
    }

    /// Replaces the duration with an explicit end time.
    #[must_use]
    pub fn with_end_time<Tz>(mut self, end: &DateTime<Tz>) -> Self
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        self.duration = None;
        self.end_time = Some(end.format(LEGACY_TIME_FORMAT).to_string());
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.activity_name.is_empty() {
            return Err(ValidationError::MissingApplication);
        }
        let start = NaiveDateTime::parse_from_str(&self.start_time, LEGACY_TIME_FORMAT)
            .map_err(|_| ValidationError::InvalidStartTime(self.start_time.clone()))?;

        match (self.duration, &self.end_time) {
            (Some(_), Some(_)) => Err(ValidationError::DurationAndEndTime),
            (None, None) => Err(ValidationError::MissingDurationOrEndTime),
            (Some(minutes), None) => {
                if minutes <= 0 {
                    Err(ValidationError::NonPositiveDuration(minutes))
                } else if minutes > MAX_LEGACY_MINUTES {
                    Err(ValidationError::DurationExceedsLimit {
                        minutes,
                        limit: MAX_LEGACY_MINUTES,
                    })
                } else {
                    Ok(())
                }
            }
            (None, Some(end)) => {
                let end_at = NaiveDateTime::parse_from_str(end, LEGACY_TIME_FORMAT)
                    .map_err(|_| ValidationError::InvalidEndTime(end.clone()))?;
                if end_at <= start {
                    return Err(ValidationError::EndNotAfterStart);
                }
                let minutes = ceil_minutes(end_at - start);
                if minutes > MAX_LEGACY_MINUTES {
                    return Err(ValidationError::DurationExceedsLimit {
                        minutes,
                        limit: MAX_LEGACY_MINUTES,
                    });
                }
                Ok(())
            }
        }
    }
}

/// Native client event, sent wrapped as `{"user_client_event": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeEvent {
    pub event_description: String,
    /// RFC 3339, UTC.
    pub start_time: String,
    /// RFC 3339, UTC.
    pub end_time: String,
    pub window_title: String,
    pub application: String,
}

/// Request body wrapping a [`NativeEvent`].
#[derive(Debug, Serialize)]
pub struct NativeRequest<'a> {
    pub user_client_event: &'a NativeEvent,
}

impl NativeEvent {
    /// Builds an event spanning `first_seen .. first_seen + total_duration`.
    pub fn from_summary(summary: &ActivitySummary) -> Self {
        let end = summary.first_seen + summary.total_duration;
        Self {
            event_description: summary.application_id.clone(),
            start_time: rfc3339(summary.first_seen),
            end_time: rfc3339(end),
            window_title: summary.activity_details.clone(),
            application: summary.application_id.clone(),
        }
    }

    pub const fn request(&self) -> NativeRequest<'_> {
        NativeRequest {
            user_client_event: self,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.application.is_empty() {
            return Err(ValidationError::MissingApplication);
        }
        let start = DateTime::parse_from_rfc3339(&self.start_time)
            .map_err(|_| ValidationError::InvalidStartTime(self.start_time.clone()))?;
        let end = DateTime::parse_from_rfc3339(&self.end_time)
            .map_err(|_| ValidationError::InvalidEndTime(self.end_time.clone()))?;
        if end <= start {
            return Err(ValidationError::EndNotAfterStart);
        }
        Ok(())
    }
}

/// Checks the invariants every sink expects of a summary.
pub fn validate_summary(summary: &ActivitySummary) -> Result<(), ValidationError> {
    if summary.application_id.is_empty() {
        return Err(ValidationError::MissingApplication);
    }
    if summary.total_duration <= Duration::zero() {
        return Err(ValidationError::NonPositiveDuration(
            summary.total_duration.num_milliseconds(),
        ));
    }
    if summary.session_count == 0 {
        return Err(ValidationError::NoSessions);
    }
    if summary.last_seen < summary.first_seen {
        return Err(ValidationError::LastSeenBeforeFirstSeen);
    }
    Ok(())
}

/// Checks a session record before it leaves the process.
pub fn validate_session(record: &SessionRecord) -> Result<(), ValidationError> {
    if record.application_id.is_empty() {
        return Err(ValidationError::MissingApplication);
    }
    if record.end_time < record.start_time {
        return Err(ValidationError::EndBeforeStart);
    }
    if record.duration != record.end_time - record.start_time {
        return Err(ValidationError::DurationMismatch);
    }
    Ok(())
}

fn ceil_minutes(duration: Duration) -> i64 {
    let ms = duration.num_milliseconds();
    if ms <= 0 {
        return ms.div_euclid(60_000);
    }
    (ms + 59_999) / 60_000
}

fn rfc3339(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    use insta::assert_json_snapshot;

    fn summary(minutes: i64) -> ActivitySummary {
        let first = Utc.with_ymd_and_hms(2025, 10, 31, 9, 15, 0).unwrap();
        ActivitySummary {
            application_id: "firefox".to_string(),
            activity_details: "GitHub - Pull requests".to_string(),
            total_duration: Duration::minutes(minutes),
            session_count: 3,
            first_seen: first,
            last_seen: first + Duration::minutes(minutes),
        }
    }

    #[test]
    fn legacy_payload_rounds_minutes_up() {
        let mut s = summary(0);
        s.total_duration = Duration::seconds(301);
        let payload = LegacyPayload::from_summary_in(&s, &Utc);
        assert_eq!(payload.duration, Some(6));

        s.total_duration = Duration::seconds(300);
        let payload = LegacyPayload::from_summary_in(&s, &Utc);
        assert_eq!(payload.duration, Some(5));
    }

    #[test]
    fn legacy_payload_serializes_expected_shape() {
        let payload = LegacyPayload::from_summary_in(&summary(42), &Utc);
        payload.validate().unwrap();
        assert_json_snapshot!(payload, @r#"
        {
          "start_time": "2025-10-31 09:15:00",
          "duration": 42,
          "activity_name": "firefox",
          "activity_details": "GitHub - Pull requests"
        }
        "#);
    }

    #[test]
    fn legacy_from_summary_uses_local_format() {
        let payload = LegacyPayload::from_summary(&summary(30));
        assert!(NaiveDateTime::parse_from_str(&payload.start_time, LEGACY_TIME_FORMAT).is_ok());
    }

    #[test]
    fn legacy_cap_is_inclusive() {
        let payload = LegacyPayload::from_summary_in(&summary(240), &Utc);
        assert_eq!(payload.validate(), Ok(()));

        let payload = LegacyPayload::from_summary_in(&summary(300), &Utc);
        assert_eq!(
            payload.validate(),
            Err(ValidationError::DurationExceedsLimit {
                minutes: 300,
                limit: 240
            })
        );
    }

    #[test]
    fn legacy_rejects_bad_fields() {
        let base = LegacyPayload::from_summary_in(&summary(10), &Utc);

        let mut p = base.clone();
        p.activity_name.clear();
        assert_eq!(p.validate(), Err(ValidationError::MissingApplication));

        let mut p = base.clone();
        p.duration = Some(0);
        assert_eq!(p.validate(), Err(ValidationError::NonPositiveDuration(0)));

        let mut p = base.clone();
        p.start_time = "2025-10-31T09:15:00Z".to_string();
        assert!(matches!(p.validate(), Err(ValidationError::InvalidStartTime(_))));

        let mut p = base.clone();
        p.end_time = Some("2025-10-31 09:30:00".to_string());
        assert_eq!(p.validate(), Err(ValidationError::DurationAndEndTime));

        let mut p = base;
        p.duration = None;
        assert_eq!(p.validate(), Err(ValidationError::MissingDurationOrEndTime));
    }

    #[test]
    fn legacy_end_time_form() {
        let s = summary(20);
        let payload = LegacyPayload::from_summary_in(&s, &Utc).with_end_time(&s.last_seen);
        assert_eq!(payload.duration, None);
        assert_eq!(payload.end_time.as_deref(), Some("2025-10-31 09:35:00"));
        payload.validate().unwrap();

        let backwards = LegacyPayload::from_summary_in(&s, &Utc).with_end_time(&s.first_seen);
        assert_eq!(backwards.validate(), Err(ValidationError::EndNotAfterStart));

        let mut garbled = payload;
        garbled.end_time = Some("later".to_string());
        assert!(matches!(garbled.validate(), Err(ValidationError::InvalidEndTime(_))));
    }

    #[test]
    fn native_event_spans_total_duration_from_first_seen() {
        let mut s = summary(0);
        s.total_duration = Duration::minutes(25);
        s.last_seen = s.first_seen + Duration::hours(2);

        let event = NativeEvent::from_summary(&s);
        event.validate().unwrap();
        assert_eq!(event.start_time, "2025-10-31T09:15:00Z");
        assert_eq!(event.end_time, "2025-10-31T09:40:00Z");

        let body = serde_json::to_value(event.request()).unwrap();
        assert_eq!(body["user_client_event"]["application"], "firefox");
        assert_eq!(body["user_client_event"]["event_description"], "firefox");
        assert_eq!(
            body["user_client_event"]["window_title"],
            "GitHub - Pull requests"
        );
    }

    #[test]
    fn native_event_rejects_empty_span() {
        let event = NativeEvent::from_summary(&summary(0));
        assert_eq!(event.validate(), Err(ValidationError::EndNotAfterStart));

        let mut event = NativeEvent::from_summary(&summary(5));
        event.application.clear();
        assert_eq!(event.validate(), Err(ValidationError::MissingApplication));
    }

    #[test]
    fn summary_validation() {
        assert_eq!(validate_summary(&summary(5)), Ok(()));

        let mut s = summary(5);
        s.session_count = 0;
        assert_eq!(validate_summary(&s), Err(ValidationError::NoSessions));

        let mut s = summary(5);
        s.last_seen = s.first_seen - Duration::seconds(1);
        assert_eq!(validate_summary(&s), Err(ValidationError::LastSeenBeforeFirstSeen));

        let s = summary(0);
        assert_eq!(validate_summary(&s), Err(ValidationError::NonPositiveDuration(0)));
    }

    #[test]
    fn session_records_are_validated() {
        let start = Utc.with_ymd_and_hms(2025, 10, 31, 9, 0, 0).unwrap();
        let mut session = crate::ActivitySession::open("code", "main.rs", start);
        session.end_time = Some(start + Duration::minutes(3));
        let record = session.record(false).unwrap();
        assert_eq!(validate_session(&record), Ok(()));

        let mut unnamed = record.clone();
        unnamed.application_id.clear();
        assert_eq!(
            validate_session(&unnamed),
            Err(ValidationError::MissingApplication)
        );

        let mut reversed = record.clone();
        reversed.end_time = start - Duration::seconds(1);
        assert_eq!(validate_session(&reversed), Err(ValidationError::EndBeforeStart));

        let mut stretched = record;
        stretched.duration = Duration::minutes(4);
        assert_eq!(
            validate_session(&stretched),
            Err(ValidationError::DurationMismatch)
        );
    }
}
