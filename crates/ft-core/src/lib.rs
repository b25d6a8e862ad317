//! Core domain logic for the focus tracker.
//!
//! This crate contains the fundamental types and logic for:
//! - Tracking: turning focus and idle observations into sessions
//! - Aggregation: folding sessions into per-application summaries
//! - Ignore policy: the persisted set of excluded applications
//! - Chunking and payloads: shaping summaries for external sinks

pub mod aggregate;
pub mod chunk;
pub mod ignore;
pub mod payload;
pub mod session;
mod source;
mod tracker;

pub use aggregate::{ActivitySummary, Summaries, summarize};
pub use chunk::{CHUNK_SIZE, chunk, chunk_all};
pub use ignore::{IgnoreList, IgnoreListError};
pub use payload::{
    LegacyPayload, MAX_LEGACY_MINUTES, NativeEvent, ValidationError, validate_session,
    validate_summary,
};
pub use session::{ActivitySession, SessionRecord, WindowSnapshot};
pub use source::{FocusSource, SourceError};
pub use tracker::{IgnoreChanges, Tracker, TrackerConfig};
