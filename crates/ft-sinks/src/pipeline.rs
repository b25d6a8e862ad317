//! Fan-out of summaries to every configured sink.

use std::sync::Arc;

use chrono::Duration;
use ft_core::{ActivitySummary, SessionRecord, chunk_all};
use tracing::{debug, error, info, warn};

use crate::{RetryPolicy, Sink, SinkError};

/// Knobs for one submission cycle.
#[derive(Debug, Clone, Copy)]
pub struct SubmitOptions {
    /// Summaries shorter than this are skipped, not failed.
    pub floor: Duration,
    pub retry: RetryPolicy,
}

impl Default for SubmitOptions {
    fn default() -> Self {
        Self {
            floor: Duration::minutes(5),
            retry: RetryPolicy::default(),
        }
    }
}

/// Outcome of one summary (or chunk) at one sink.
#[derive(Debug, Clone)]
pub struct SinkOutcome {
    pub sink: String,
    pub application_id: String,
    pub duration: Duration,
    pub result: Result<(), SinkError>,
}

/// Outcome of the session records at one sink.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub sink: String,
    pub count: usize,
    pub result: Result<(), SinkError>,
}

/// Everything that happened during one [`submit_all`] call.
#[derive(Debug, Clone, Default)]
pub struct SubmissionReport {
    /// Application ids below the floor.
    pub skipped: Vec<String>,
    pub outcomes: Vec<SinkOutcome>,
    pub session_outcomes: Vec<SessionOutcome>,
}

impl SubmissionReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// Whether some failure might succeed on a later cycle.
    pub fn has_transient_failures(&self) -> bool {
        let transient = |result: &Result<(), SinkError>| {
            result.as_ref().is_err_and(SinkError::is_retryable)
        };
        self.outcomes.iter().any(|o| transient(&o.result))
            || self.session_outcomes.iter().any(|o| transient(&o.result))
    }
}

/// Submits `summaries` to every sink, and `sessions` to the sinks that
/// record them.
///
/// Summaries below the floor are skipped. The rest are chunked to each
/// sink's cap and handed over as one batch per sink. One summary's failure
/// never stops the others.
pub async fn submit_all(
    sinks: &[Arc<dyn Sink>],
    summaries: &[ActivitySummary],
    sessions: &[SessionRecord],
    options: &SubmitOptions,
) -> SubmissionReport {
    let mut report = SubmissionReport::default();

    let eligible: Vec<&ActivitySummary> = summaries
        .iter()
        .filter(|summary| {
            if summary.total_duration < options.floor {
                debug!(
                    application_id = %summary.application_id,
                    duration_secs = summary.total_duration.num_seconds(),
                    "below submission floor, skipping"
                );
                report.skipped.push(summary.application_id.clone());
                false
            } else {
                true
            }
        })
        .collect();

    if eligible.is_empty() && sessions.is_empty() {
        return report;
    }

    for sink in sinks {
        if sink.records_sessions() && !sessions.is_empty() {
            let result = sink.submit_sessions(sessions, &options.retry).await;
            if let Err(err) = &result {
                error!(sink = sink.name(), error = %err, "session submission failed");
            }
            report.session_outcomes.push(SessionOutcome {
                sink: sink.name().to_string(),
                count: sessions.len(),
                result,
            });
        }
        if eligible.is_empty() {
            continue;
        }

        let batch = match sink.max_entry_duration() {
            Some(max) => chunk_all(eligible.iter().copied(), max),
            None => eligible.iter().map(|s| (*s).clone()).collect(),
        };
        let results = sink.submit_batch(&batch, &options.retry).await;

        for (summary, result) in batch.iter().zip(results) {
            if let Err(err) = &result {
                if err.is_retryable() {
                    error!(
                        sink = sink.name(),
                        application_id = %summary.application_id,
                        error = %err,
                        "submission failed after retries"
                    );
                } else {
                    warn!(
                        sink = sink.name(),
                        application_id = %summary.application_id,
                        error = %err,
                        "submission rejected"
                    );
                }
            }
            report.outcomes.push(SinkOutcome {
                sink: sink.name().to_string(),
                application_id: summary.application_id.clone(),
                duration: summary.total_duration,
                result,
            });
        }
    }

    info!(
        succeeded = report.succeeded(),
        failed = report.failed(),
        skipped = report.skipped.len(),
        sessions = sessions.len(),
        "submission cycle finished"
    );
    report
}
