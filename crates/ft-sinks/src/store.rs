//! Relational store sink.

use std::future::ready;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use ft_core::{ActivitySummary, SessionRecord, validate_session, validate_summary};
use ft_db::Database;

use crate::{RetryPolicy, Sink, SinkError};

/// Records summaries in the local SQLite store.
pub struct StoreSink {
    db: Mutex<Database>,
}

impl StoreSink {
    pub const fn new(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }

    fn db(&self) -> MutexGuard<'_, Database> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn store_summaries(&self, summaries: &[ActivitySummary]) -> Result<(), SinkError> {
        let count = self.db().insert_summaries(summaries, Utc::now())?;
        tracing::debug!(count, "stored summaries");
        Ok(())
    }

    fn store_sessions(&self, sessions: &[SessionRecord]) -> Result<(), SinkError> {
        let count = self.db().insert_sessions(sessions, Utc::now())?;
        tracing::debug!(count, "stored sessions");
        Ok(())
    }
}

impl std::fmt::Debug for StoreSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreSink").finish_non_exhaustive()
    }
}

#[async_trait]
impl Sink for StoreSink {
    fn name(&self) -> &str {
        "store"
    }

    async fn submit(&self, summary: &ActivitySummary) -> Result<(), SinkError> {
        validate_summary(summary)?;
        let id = self.db().insert_summary(summary, Utc::now())?;
        tracing::debug!(id, application_id = %summary.application_id, "stored summary");
        Ok(())
    }

    /// Stores every valid summary in one transaction. Invalid summaries fail
    /// individually; the transaction's outcome applies to the rest.
    async fn submit_batch(
        &self,
        summaries: &[ActivitySummary],
        retry: &RetryPolicy,
    ) -> Vec<Result<(), SinkError>> {
        let mut results: Vec<Result<(), SinkError>> = summaries
            .iter()
            .map(|s| validate_summary(s).map_err(SinkError::from))
            .collect();

        let valid: Vec<ActivitySummary> = summaries
            .iter()
            .zip(&results)
            .filter(|(_, result)| result.is_ok())
            .map(|(summary, _)| summary.clone())
            .collect();
        if valid.is_empty() {
            return results;
        }

        let outcome = retry
            .run(self.name(), || ready(self.store_summaries(&valid)))
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

    async fn submit_sessions(
        &self,
        sessions: &[SessionRecord],
        retry: &RetryPolicy,
    ) -> Result<(), SinkError> {
        let valid: Vec<SessionRecord> = sessions
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
            .cloned()
            .collect();
        if valid.is_empty() {
            return Ok(());
        }
        retry
            .run(self.name(), || ready(self.store_sessions(&valid)))
            .await
    }
}
