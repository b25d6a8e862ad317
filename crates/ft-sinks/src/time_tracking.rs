//! Time-tracking API sink.
//!
//! Summaries go through an ordered list of strategies: the native client
//! event endpoint when native credentials are configured, then the legacy
//! offline-time endpoint. The first strategy to succeed wins.

use std::fmt;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::Duration;
use ft_core::{ActivitySummary, CHUNK_SIZE, LegacyPayload, NativeEvent};
use tracing::{debug, warn};

use crate::{Sink, SinkError};

/// Request timeout for API calls.
const API_TIMEOUT: StdDuration = StdDuration::from_secs(10);

pub const LEGACY_ENDPOINT: &str = "https://www.rescuetime.com/anapi/offline_time_post";
pub const NATIVE_ENDPOINT: &str = "https://api.rescuetime.com/api/resource/user_client_events";

/// API keys. Any subset may be set.
#[derive(Clone, Default)]
pub struct Credentials {
    /// Legacy API key, also the fallback for native auth.
    pub api_key: Option<String>,
    /// Native account key, sent as the `key` query parameter.
    pub account_key: Option<String>,
    /// Native data key, sent as a bearer token.
    pub data_key: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &redact(self.api_key.as_ref()))
            .field("account_key", &redact(self.account_key.as_ref()))
            .field("data_key", &redact(self.data_key.as_ref()))
            .finish()
    }
}

fn redact(value: Option<&String>) -> Option<&'static str> {
    value.map(|_| "[REDACTED]")
}

/// Endpoint URLs, overridable for testing or proxies.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub legacy: String,
    pub native: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            legacy: LEGACY_ENDPOINT.to_string(),
            native: NATIVE_ENDPOINT.to_string(),
        }
    }
}

/// Submits through the native client event endpoint.
struct NativeStrategy {
    url: String,
    query_key: Option<String>,
    bearer_key: Option<String>,
    account_key: Option<String>,
}

impl NativeStrategy {
    async fn send(&self, http: &reqwest::Client, summary: &ActivitySummary) -> Result<(), SinkError> {
        let event = NativeEvent::from_summary(summary);
        event.validate()?;
        let body = event.request();

        if let Some(key) = &self.query_key {
            let response = http
                .post(&self.url)
                .query(&[("key", key)])
                .json(&body)
                .send()
                .await?;
            match read_status(response).await {
                Err(SinkError::Rejected { status: 401, .. }) if self.bearer_key.is_some() => {
                    debug!("query key rejected, trying bearer authentication");
                }
                other => return other,
            }
        }

        let Some(token) = &self.bearer_key else {
            return Err(SinkError::Config("no native API key".to_string()));
        };
        let mut request = http.post(&self.url).bearer_auth(token).json(&body);
        if let Some(account) = &self.account_key {
            request = request.query(&[("key", account)]);
        }
        read_status(request.send().await?).await
    }
}

/// Submits through the legacy offline-time endpoint.
struct LegacyStrategy {
    url: String,
    api_key: String,
}

impl LegacyStrategy {
    async fn send(&self, http: &reqwest::Client, summary: &ActivitySummary) -> Result<(), SinkError> {
        let payload = LegacyPayload::from_summary(summary);
        payload.validate()?;
        let response = http
            .post(&self.url)
            .query(&[("key", &self.api_key)])
            .json(&payload)
            .send()
            .await?;
        read_status(response).await
    }
}

enum Strategy {
    Native(NativeStrategy),
    Legacy(LegacyStrategy),
}

impl Strategy {
    const fn name(&self) -> &'static str {
        match self {
            Self::Native(_) => "native",
            Self::Legacy(_) => "legacy",
        }
    }

    async fn send(&self, http: &reqwest::Client, summary: &ActivitySummary) -> Result<(), SinkError> {
        match self {
            Self::Native(strategy) => strategy.send(http, summary).await,
            Self::Legacy(strategy) => strategy.send(http, summary).await,
        }
    }
}

/// Time-tracking API client.
///
/// # Thread Safety
///
/// The sink is safe to share across tasks; requests share the underlying
/// HTTP connection pool.
pub struct TimeTrackingSink {
    http: reqwest::Client,
    strategies: Vec<Strategy>,
}

impl fmt::Debug for TimeTrackingSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let strategies: Vec<_> = self.strategies.iter().map(Strategy::name).collect();
        f.debug_struct("TimeTrackingSink")
            .field("strategies", &strategies)
            .finish_non_exhaustive()
    }
}

impl TimeTrackingSink {
    /// Creates a sink from whichever credentials are present.
    ///
    /// # Errors
    ///
    /// Returns an error if no credential is set, or if the HTTP client fails
    /// to build.
    pub fn new(credentials: Credentials, endpoints: Endpoints) -> Result<Self, SinkError> {
        let Credentials {
            api_key,
            account_key,
            data_key,
        } = credentials;
        let api_key = api_key.filter(|k| !k.trim().is_empty());
        let account_key = account_key.filter(|k| !k.trim().is_empty());
        let data_key = data_key.filter(|k| !k.trim().is_empty());

        let mut strategies = Vec::new();
        if account_key.is_some() || data_key.is_some() {
            strategies.push(Strategy::Native(NativeStrategy {
                url: endpoints.native,
                query_key: account_key.clone().or_else(|| api_key.clone()),
                bearer_key: data_key.or_else(|| api_key.clone()),
                account_key,
            }));
        }
        if let Some(api_key) = api_key {
            strategies.push(Strategy::Legacy(LegacyStrategy {
                url: endpoints.legacy,
                api_key,
            }));
        }
        if strategies.is_empty() {
            return Err(SinkError::Config(
                "no time-tracking API key configured".to_string(),
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(API_TIMEOUT)
            .user_agent(concat!("ft/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| SinkError::ClientBuild(err.to_string()))?;

        Ok(Self { http, strategies })
    }

    /// Names of the configured strategies, in the order they are tried.
    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(Strategy::name).collect()
    }
}

#[async_trait]
impl Sink for TimeTrackingSink {
    fn name(&self) -> &str {
        "time-tracking"
    }

    fn max_entry_duration(&self) -> Option<Duration> {
        Some(CHUNK_SIZE)
    }

    async fn submit(&self, summary: &ActivitySummary) -> Result<(), SinkError> {
        let mut last_err = None;
        for (index, strategy) in self.strategies.iter().enumerate() {
            match strategy.send(&self.http, summary).await {
                Ok(()) => {
                    debug!(
                        application_id = %summary.application_id,
                        strategy = strategy.name(),
                        "submitted"
                    );
                    return Ok(());
                }
                Err(err) => {
                    if index + 1 < self.strategies.len() {
                        warn!(
                            application_id = %summary.application_id,
                            strategy = strategy.name(),
                            error = %err,
                            "strategy failed, falling back"
                        );
                    }
                    last_err = Some(err);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| SinkError::Config("no strategies".to_string())))
    }
}

async fn read_status(response: reqwest::Response) -> Result<(), SinkError> {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    SinkError::from_status(status, body)
}
