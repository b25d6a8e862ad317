use async_trait::async_trait;
use chrono::Duration;
use ft_core::{ActivitySummary, SessionRecord};

use crate::{RetryPolicy, SinkError};

/// A destination for activity summaries.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Short name used in logs and reports.
    fn name(&self) -> &str;

    /// Longest summary this sink accepts in one entry. `None` means no cap.
    fn max_entry_duration(&self) -> Option<Duration> {
        None
    }

    /// Submits one summary with a single attempt.
    async fn submit(&self, summary: &ActivitySummary) -> Result<(), SinkError>;

    /// Submits each summary, retrying per `retry`.
    ///
    /// Returns one result per input, in order. A failure never stops the
    /// remaining summaries from being attempted.
    async fn submit_batch(
        &self,
        summaries: &[ActivitySummary],
        retry: &RetryPolicy,
    ) -> Vec<Result<(), SinkError>> {
        let mut results = Vec::with_capacity(summaries.len());
        for summary in summaries {
            results.push(retry.run(self.name(), || self.submit(summary)).await);
        }
        results
    }

    /// Whether this sink keeps raw session records.
    fn records_sessions(&self) -> bool {
        false
    }

    /// Submits closed session records. Only called when
    /// [`records_sessions`](Self::records_sessions) is `true`.
    async fn submit_sessions(
        &self,
        sessions: &[SessionRecord],
        retry: &RetryPolicy,
    ) -> Result<(), SinkError> {
        let _ = (sessions, retry);
        Ok(())
    }
}
