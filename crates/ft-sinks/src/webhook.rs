//! Generic webhook sink.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ft_core::{ActivitySummary, SessionRecord, validate_session, validate_summary};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use uuid::Uuid;

use crate::{RetryPolicy, Sink, SinkError};

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(30);
const SOURCE: &str = "ft";

/// JSON body posted to the webhook.
#[derive(Debug, Serialize)]
pub struct Envelope<'a> {
    pub submission_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub source: &'static str,
    pub version: &'static str,
    pub host: Option<String>,
    pub summaries: Vec<&'a ActivitySummary>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sessions: Vec<&'a SessionRecord>,
    pub metadata: Metadata,
}

#[derive(Debug, Serialize)]
pub struct Metadata {
    pub count: usize,
    pub session_count: usize,
}

impl<'a> Envelope<'a> {
    pub fn new(
        summaries: Vec<&'a ActivitySummary>,
        sessions: Vec<&'a SessionRecord>,
        host: Option<String>,
    ) -> Self {
        Self {
            submission_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: SOURCE,
            version: env!("CARGO_PKG_VERSION"),
            host,
            metadata: Metadata {
                count: summaries.len(),
                session_count: sessions.len(),
            },
            summaries,
            sessions,
        }
    }
}

/// Posts summaries to an arbitrary HTTP endpoint.
pub struct WebhookSink {
    http: reqwest::Client,
    url: String,
    host: Option<String>,
}

impl fmt::Debug for WebhookSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Webhook URLs often embed tokens.
        f.debug_struct("WebhookSink")
            .field("url", &"[REDACTED]")
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

impl WebhookSink {
    /// Creates a sink posting to `url` with extra `headers` on every request.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is not http(s), a header is invalid, or
    /// the HTTP client fails to build.
    pub fn new(url: impl Into<String>, headers: &BTreeMap<String, String>) -> Result<Self, SinkError> {
        let url = url.into();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(SinkError::Config(
                "webhook URL must start with http:// or https://".to_string(),
            ));
        }

        let mut default_headers = HeaderMap::new();
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| SinkError::Config(format!("invalid header name: {name}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| SinkError::Config(format!("invalid value for header {name}")))?;
            default_headers.insert(name, value);
        }

        let http = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .user_agent(concat!("ft/", env!("CARGO_PKG_VERSION")))
            .default_headers(default_headers)
            .build()
            .map_err(|err| SinkError::ClientBuild(err.to_string()))?;

        let host = hostname::get().ok().and_then(|h| h.into_string().ok());

        Ok(Self { http, url, host })
    }

    async fn post(
        &self,
        summaries: Vec<&ActivitySummary>,
        sessions: Vec<&SessionRecord>,
    ) -> Result<(), SinkError> {
        let envelope = Envelope::new(summaries, sessions, self.host.clone());
        tracing::debug!(
            submission_id = %envelope.submission_id,
            count = envelope.metadata.count,
            session_count = envelope.metadata.session_count,
            "posting webhook"
        );
        let response = self.http.post(&self.url).json(&envelope).send().await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        SinkError::from_status(status, body)
    }
}

#[async_trait]
impl Sink for WebhookSink {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn submit(&self, summary: &ActivitySummary) -> Result<(), SinkError> {
        validate_summary(summary)?;
        self.post(vec![summary], Vec::new()).await
    }

    /// Sends every valid summary in one envelope. Invalid summaries fail
    /// individually; the shared request's outcome applies to the rest.
    async fn submit_batch(
        &self,
        summaries: &[ActivitySummary],
        retry: &RetryPolicy,
    ) -> Vec<Result<(), SinkError>> {
        let mut results: Vec<Result<(), SinkError>> = summaries
            .iter()
            .map(|s| validate_summary(s).map_err(SinkError::from))
            .collect();

        let valid: Vec<&ActivitySummary> = summaries
            .iter()
            .zip(&results)
            .filter(|(_, result)| result.is_ok())
            .map(|(summary, _)| summary)
            .collect();
        if valid.is_empty() {
            return results;
        }

        let outcome = retry
            .run(self.name(), || self.post(valid.clone(), Vec::new()))
            .await;
        if let Err(err) = outcome {
            for result in results.iter_mut().filter(|r| r.is_ok()) {
                *result = Err(err.clone());
            }
        }
        results
    }

    fn records_sessions(&self) -> bool {
        true
    }

    /// Posts valid sessions in one envelope with no summaries. Invalid
    /// sessions are logged and left out.
    async fn submit_sessions(
        &self,
        sessions: &[SessionRecord],
        retry: &RetryPolicy,
    ) -> Result<(), SinkError> {
        let valid: Vec<&SessionRecord> = sessions
            .iter()
            .filter(|session| match validate_session(session) {
                Ok(()) => true,
                Err(err) => {
                    tracing::warn!(
                        application_id = %session.application_id,
                        error = %err,
                        "skipping invalid session"
                    );
                    false
                }
            })
            .collect();
        if valid.is_empty() {
            return Ok(());
        }
        retry
            .run(self.name(), || self.post(Vec::new(), valid.clone()))
            .await
    }
}
