//! Shared formatting helpers for CLI commands.

use chrono::{DateTime, Duration, Local, Utc};

/// Formats a duration as "Xh Ym", "Ym", or "Zs" below one minute.
pub fn format_duration(duration: Duration) -> String {
    let seconds = duration.num_seconds();
    if seconds <= 0 {
        return "0s".to_string();
    }
    if seconds < 60 {
        return format!("{seconds}s");
    }
    let total_minutes = seconds / 60;
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;

    if hours >= 1 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

/// Formats a UTC timestamp as local wall-clock time.
pub fn format_local(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

/// The one-line description printed for a focused window.
pub fn format_window(application_id: &str, window_title: &str) -> String {
    format!("Active Window: {window_title} ({application_id})")
}
