//! Submission sinks for the focus tracker.
//!
//! Provides:
//! - The [`Sink`] contract and a shared [`RetryPolicy`]
//! - A time-tracking API sink with native and legacy strategies
//! - A generic webhook sink
//! - A local SQLite store sink
//! - [`submit_all`], which filters, chunks and fans summaries out to sinks

mod error;
mod pipeline;
mod retry;
mod sink;
pub mod store;
pub mod time_tracking;
pub mod webhook;

pub use error::SinkError;
pub use pipeline::{SessionOutcome, SinkOutcome, SubmissionReport, SubmitOptions, submit_all};
pub use retry::RetryPolicy;
pub use sink::Sink;
pub use store::StoreSink;
pub use time_tracking::TimeTrackingSink;
pub use webhook::WebhookSink;
