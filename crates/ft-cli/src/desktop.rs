//! GNOME focus and idle queries over `gdbus`.
//!
//! The focused window comes from the *Focused Window D-Bus* shell extension,
//! which replies with a GVariant tuple wrapping a JSON object. Idle time comes
//! from Mutter's idle monitor.

use std::process::Command;
use std::sync::LazyLock;

use chrono::Duration;
use ft_core::{FocusSource, SourceError, WindowSnapshot};
use regex::Regex;
use serde::Deserialize;

const FOCUS_DEST: &str = "org.gnome.Shell";
const FOCUS_PATH: &str = "/org/gnome/shell/extensions/FocusedWindow";
const FOCUS_METHOD: &str = "org.gnome.shell.extensions.FocusedWindow.Get";

const IDLE_DEST: &str = "org.gnome.Mutter.IdleMonitor";
const IDLE_PATH: &str = "/org/gnome/Mutter/IdleMonitor/Core";
const IDLE_METHOD: &str = "org.gnome.Mutter.IdleMonitor.GetIdletime";

/// `('...',)` or `("...",)`
static STRING_TUPLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)^\(\s*(?:'(.*)'|"(.*)")\s*,\s*\)$"#).unwrap()
});

/// `(uint64 1234,)`
static UINT64_TUPLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\(\s*(?:uint64\s+)?(\d+)\s*,\s*\)$").unwrap()
});

/// Focus source backed by the GNOME session bus.
#[derive(Debug, Default, Clone, Copy)]
pub struct GnomeSource;

impl GnomeSource {
    pub const fn new() -> Self {
        Self
    }
}

impl FocusSource for GnomeSource {
    fn poll(&self) -> Result<WindowSnapshot, SourceError> {
        let reply = gdbus_call(FOCUS_DEST, FOCUS_PATH, FOCUS_METHOD)?;
        parse_focus_reply(&reply)
    }

    fn poll_idle_duration(&self) -> Result<Duration, SourceError> {
        let reply = gdbus_call(IDLE_DEST, IDLE_PATH, IDLE_METHOD)?;
        parse_idle_reply(&reply)
    }
}

fn gdbus_call(dest: &str, object_path: &str, method: &str) -> Result<String, SourceError> {
    let output = Command::new("gdbus")
        .args(["call", "--session", "--dest", dest])
        .args(["--object-path", object_path, "--method", method])
        .output()
        .map_err(|err| SourceError::Unavailable(format!("failed to run gdbus: {err}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(SourceError::Unavailable(format!(
            "{method} failed: {}",
            stderr.trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[derive(Debug, Deserialize)]
struct FocusedWindow {
    #[serde(default)]
    title: String,
    #[serde(default)]
    wm_class: String,
}

/// Parses the extension's reply into a snapshot.
///
/// An empty string inside the tuple means nothing has focus.
pub fn parse_focus_reply(reply: &str) -> Result<WindowSnapshot, SourceError> {
    let caps = STRING_TUPLE_RE
        .captures(reply.trim())
        .ok_or_else(|| SourceError::InvalidReply(format!("not a string tuple: {reply}")))?;
    let quoted = caps
        .get(1)
        .or_else(|| caps.get(2))
        .map_or("", |m| m.as_str());
    let json = unescape_gvariant(quoted)?;

    if json.trim().is_empty() {
        return Ok(WindowSnapshot::new("", ""));
    }

    let window: FocusedWindow = serde_json::from_str(&json)
        .map_err(|err| SourceError::InvalidReply(format!("invalid window JSON: {err}")))?;
    Ok(WindowSnapshot::new(window.wm_class, window.title))
}

/// Parses Mutter's idle time (milliseconds) reply.
pub fn parse_idle_reply(reply: &str) -> Result<Duration, SourceError> {
    let caps = UINT64_TUPLE_RE
        .captures(reply.trim())
        .ok_or_else(|| SourceError::InvalidReply(format!("not a uint64 tuple: {reply}")))?;
    let millis: i64 = caps[1]
        .parse()
        .map_err(|err| SourceError::InvalidReply(format!("idle time out of range: {err}")))?;
    Ok(Duration::milliseconds(millis))
}

/// Undoes GVariant text escaping inside a quoted string.
fn unescape_gvariant(quoted: &str) -> Result<String, SourceError> {
    let mut out = String::with_capacity(quoted.len());
    let mut chars = quoted.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                let decoded = u32::from_str_radix(&hex, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| SourceError::InvalidReply(format!("bad escape \\u{hex}")))?;
                out.push(decoded);
            }
            Some(other) => out.push(other),
            None => {
                return Err(SourceError::InvalidReply(
                    "dangling backslash in reply".to_string(),
                ));
            }
        }
    }
    Ok(out)
}
