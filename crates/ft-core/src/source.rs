//! Contract for desktop focus and idle queries.

use chrono::Duration;
use thiserror::Error;

use crate::session::WindowSnapshot;

#[derive(Debug, Error)]
pub enum SourceError {
    /// The desktop service could not be reached. Callers skip the cycle.
    #[error("focus source unavailable: {0}")]
    Unavailable(String),
    #[error("unexpected reply from focus source: {0}")]
    InvalidReply(String),
}

/// Something that can report the focused window and how long the user has
/// been idle.
pub trait FocusSource: Send + Sync {
    fn poll(&self) -> Result<WindowSnapshot, SourceError>;

    fn poll_idle_duration(&self) -> Result<Duration, SourceError>;
}
