//! Configuration loading and management.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;

use anyhow::bail;
use chrono::Duration;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use ft_core::TrackerConfig;
use ft_sinks::time_tracking::{Credentials, Endpoints};
use serde::{Deserialize, Serialize};

const MIN_POLL_INTERVAL_MS: u64 = 50;
const SLOW_POLL_INTERVAL_MS: u64 = 5_000;
const MIN_SUBMIT_INTERVAL_SECS: u64 = 60;
const MIN_API_KEY_LEN: usize = 20;

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How often the focused window is sampled.
    pub poll_interval_ms: u64,
    /// How often accumulated summaries are submitted.
    pub submit_interval_secs: u64,
    /// Idle time after which the current session is closed.
    pub idle_threshold_secs: u64,
    pub merge_threshold_secs: u64,
    pub min_duration_secs: u64,
    /// Summaries shorter than this are not submitted.
    pub submit_floor_secs: u64,
    /// Path to the ignore list.
    pub ignore_path: PathBuf,
    /// Where `--save` writes summaries.
    pub sessions_path: PathBuf,
    /// SQLite store for submitted summaries. Enables the store sink.
    pub database_path: Option<PathBuf>,
    pub time_tracking: TimeTrackingConfig,
    pub webhook: WebhookConfig,
}

/// Time-tracking API settings.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeTrackingConfig {
    pub api_key: Option<String>,
    pub account_key: Option<String>,
    pub data_key: Option<String>,
    pub legacy_endpoint: Option<String>,
    pub native_endpoint: Option<String>,
}

/// Generic webhook settings.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub url: Option<String>,
    /// Extra headers sent with every request.
    pub headers: BTreeMap<String, String>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("submit_interval_secs", &self.submit_interval_secs)
            .field("idle_threshold_secs", &self.idle_threshold_secs)
            .field("merge_threshold_secs", &self.merge_threshold_secs)
            .field("min_duration_secs", &self.min_duration_secs)
            .field("submit_floor_secs", &self.submit_floor_secs)
            .field("ignore_path", &self.ignore_path)
            .field("sessions_path", &self.sessions_path)
            .field("database_path", &self.database_path)
            .field("time_tracking", &self.time_tracking)
            .field("webhook", &self.webhook)
            .finish()
    }
}

impl fmt::Debug for TimeTrackingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeTrackingConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("account_key", &self.account_key.as_ref().map(|_| "[REDACTED]"))
            .field("data_key", &self.data_key.as_ref().map(|_| "[REDACTED]"))
            .field("legacy_endpoint", &self.legacy_endpoint)
            .field("native_endpoint", &self.native_endpoint)
            .finish()
    }
}

impl fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Both the URL and header values tend to carry tokens.
        f.debug_struct("WebhookConfig")
            .field("url", &self.url.as_ref().map(|_| "[REDACTED]"))
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = dirs_config_path().unwrap_or_else(|| PathBuf::from("."));
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            poll_interval_ms: 1_000,
            submit_interval_secs: 15 * 60,
            idle_threshold_secs: 5 * 60,
            merge_threshold_secs: 30,
            min_duration_secs: 10,
            submit_floor_secs: 5 * 60,
            ignore_path: config_dir.join("ignore"),
            sessions_path: data_dir.join("sessions.json"),
            database_path: None,
            time_tracking: TimeTrackingConfig::default(),
            webhook: WebhookConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // FT_WEBHOOK__URL -> webhook.url
        figment = figment.merge(Env::prefixed("FT_").split("__"));

        figment.extract()
    }

    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            merge_threshold: secs(self.merge_threshold_secs),
            min_duration: secs(self.min_duration_secs),
        }
    }

    pub const fn poll_interval(&self) -> StdDuration {
        StdDuration::from_millis(self.poll_interval_ms)
    }

    pub const fn submit_interval(&self) -> StdDuration {
        StdDuration::from_secs(self.submit_interval_secs)
    }

    pub fn idle_threshold(&self) -> Duration {
        secs(self.idle_threshold_secs)
    }

    pub fn submit_floor(&self) -> Duration {
        secs(self.submit_floor_secs)
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            api_key: self.time_tracking.api_key.clone(),
            account_key: self.time_tracking.account_key.clone(),
            data_key: self.time_tracking.data_key.clone(),
        }
    }

    pub fn endpoints(&self) -> Endpoints {
        let defaults = Endpoints::default();
        Endpoints {
            legacy: self
                .time_tracking
                .legacy_endpoint
                .clone()
                .unwrap_or(defaults.legacy),
            native: self
                .time_tracking
                .native_endpoint
                .clone()
                .unwrap_or(defaults.native),
        }
    }

    /// Whether any time-tracking API key is configured.
    pub fn has_time_tracking_keys(&self) -> bool {
        let keys = &self.time_tracking;
        [&keys.api_key, &keys.account_key, &keys.data_key]
            .into_iter()
            .flatten()
            .any(|key| !key.trim().is_empty())
    }

    /// Checks intervals, and API keys when `submitting` for real.
    pub fn validate(&self, submitting: bool) -> anyhow::Result<()> {
        if self.submit_interval_secs < MIN_SUBMIT_INTERVAL_SECS {
            bail!(
                "submit interval must be at least {MIN_SUBMIT_INTERVAL_SECS} seconds, got {}",
                self.submit_interval_secs
            );
        }
        if self.poll_interval_ms < MIN_POLL_INTERVAL_MS {
            bail!(
                "poll interval must be at least {MIN_POLL_INTERVAL_MS}ms, got {}ms",
                self.poll_interval_ms
            );
        }
        if self.poll_interval_ms > SLOW_POLL_INTERVAL_MS {
            tracing::warn!(
                poll_interval_ms = self.poll_interval_ms,
                "poll interval is long, short focus changes may be missed"
            );
        }

        if submitting {
            let configured_sinks = self.has_time_tracking_keys()
                || self.webhook.url.is_some()
                || self.database_path.is_some();
            if !configured_sinks {
                bail!(
                    "no sink configured: set time_tracking.api_key, webhook.url or database_path"
                );
            }
            if let Some(key) = &self.time_tracking.api_key {
                if key.trim().len() < MIN_API_KEY_LEN {
                    bail!("time_tracking.api_key looks too short to be valid");
                }
            }
        }
        Ok(())
    }
}

fn secs(value: u64) -> Duration {
    i64::try_from(value)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}

/// Returns the platform-specific config directory for ft.
///
/// On Linux: `~/.config/ft`
pub fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("ft"))
}

/// Returns the platform-specific data directory for ft.
///
/// On Linux: `~/.local/share/ft`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("ft"))
}

#[cfg(test)]
mod tests {
    use super::*;

    use figment::Jail;

    #[test]
    fn test_dirs_config_path_ends_with_ft() {
        let path = dirs_config_path().unwrap();
        assert_eq!(path.file_name().unwrap(), "ft");
    }

    #[test]
    fn test_default_paths() {
        let config = Config::default();
        assert_eq!(config.ignore_path, dirs_config_path().unwrap().join("ignore"));
        assert_eq!(
            config.sessions_path,
            dirs_data_path().unwrap().join("sessions.json")
        );
        assert!(config.database_path.is_none());
    }

    #[test]
    fn test_default_tracker_thresholds() {
        let tracker = Config::default().tracker_config();
        assert_eq!(tracker.merge_threshold, Duration::seconds(30));
        assert_eq!(tracker.min_duration, Duration::seconds(10));
    }

    #[test]
    fn test_defaults_pass_validation_when_not_submitting() {
        Config::default().validate(false).unwrap();
    }

    #[test]
    fn test_rejects_short_submit_interval() {
        let config = Config {
            submit_interval_secs: 59,
            ..Config::default()
        };
        assert!(config.validate(false).is_err());
    }

    #[test]
    fn test_rejects_fast_poll_interval() {
        let config = Config {
            poll_interval_ms: 49,
            ..Config::default()
        };
        assert!(config.validate(false).is_err());

        let config = Config {
            poll_interval_ms: 50,
            ..Config::default()
        };
        assert!(config.validate(false).is_ok());
    }

    #[test]
    fn test_submitting_requires_a_sink() {
        assert!(Config::default().validate(true).is_err());

        let config = Config {
            database_path: Some(PathBuf::from("ft.db")),
            ..Config::default()
        };
        assert!(config.validate(true).is_ok());
    }

    #[test]
    fn test_submitting_rejects_short_api_key() {
        let mut config = Config::default();
        config.time_tracking.api_key = Some("short".to_string());
        assert!(config.validate(true).is_err());

        config.time_tracking.api_key = Some("a".repeat(20));
        assert!(config.validate(true).is_ok());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut config = Config::default();
        config.time_tracking.api_key = Some("super-secret-api-key".to_string());
        config.webhook.url = Some("https://example.com/hook?token=abc".to_string());
        config
            .webhook
            .headers
            .insert("Authorization".to_string(), "Bearer xyz".to_string());

        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret-api-key"));
        assert!(!debug.contains("token=abc"));
        assert!(!debug.contains("Bearer xyz"));
        assert!(debug.contains("Authorization"));
    }

    #[test]
    fn test_file_and_env_layering() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "ft.toml",
                r#"
                    poll_interval_ms = 250
                    database_path = "/tmp/ft.db"

                    [webhook]
                    url = "https://example.com/hook"

                    [webhook.headers]
                    X-Token = "abc"
                "#,
            )?;
            jail.set_env("FT_SUBMIT_INTERVAL_SECS", "120");
            jail.set_env("FT_TIME_TRACKING__API_KEY", "0123456789abcdefghij");

            let config = Config::load_from(Some(Path::new("ft.toml")))?;
            assert_eq!(config.poll_interval_ms, 250);
            assert_eq!(config.submit_interval_secs, 120);
            assert_eq!(config.idle_threshold_secs, 300);
            assert_eq!(config.database_path, Some(PathBuf::from("/tmp/ft.db")));
            assert_eq!(
                config.webhook.url.as_deref(),
                Some("https://example.com/hook")
            );
            assert_eq!(config.webhook.headers["X-Token"], "abc");
            assert_eq!(
                config.time_tracking.api_key.as_deref(),
                Some("0123456789abcdefghij")
            );
            Ok(())
        });
    }

    #[test]
    fn test_endpoint_overrides() {
        let mut config = Config::default();
        config.time_tracking.native_endpoint = Some("http://localhost:1/native".to_string());
        let endpoints = config.endpoints();
        assert_eq!(endpoints.native, "http://localhost:1/native");
        assert_eq!(endpoints.legacy, Endpoints::default().legacy);
    }
}
