use ft_core::ValidationError;
use thiserror::Error;

/// Sink submission errors.
///
/// Errors are cloneable so one failed batch request can be reported against
/// every summary it carried.
#[derive(Debug, Clone, Error)]
pub enum SinkError {
    /// Network failure, timeout or connection refused.
    #[error("request failed: {0}")]
    Transport(String),
    /// The server answered with a 5xx status.
    #[error("server error {status}: {body}")]
    Server { status: u16, body: String },
    /// The server answered with a non-success status that is not a 5xx.
    #[error("rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
    /// The payload failed local validation and was never sent.
    #[error("invalid payload: {0}")]
    Validation(#[from] ValidationError),
    /// The relational store failed.
    #[error("store error: {message}")]
    Store { message: String, busy: bool },
    /// Failed to build HTTP client.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(String),
    /// The sink is missing required configuration.
    #[error("sink misconfigured: {0}")]
    Config(String),
}

impl SinkError {
    /// Whether another attempt could succeed.
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Server { .. } => true,
            Self::Store { busy, .. } => *busy,
            Self::Rejected { .. } | Self::Validation(_) | Self::ClientBuild(_) | Self::Config(_) => {
                false
            }
        }
    }

    /// Classifies an HTTP status and response body.
    pub(crate) fn from_status(status: reqwest::StatusCode, body: String) -> Result<(), Self> {
        if status.is_success() {
            Ok(())
        } else if status.is_server_error() {
            Err(Self::Server {
                status: status.as_u16(),
                body,
            })
        } else {
            Err(Self::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}

impl From<reqwest::Error> for SinkError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<ft_db::DbError> for SinkError {
    fn from(err: ft_db::DbError) -> Self {
        Self::Store {
            busy: err.is_busy(),
            message: err.to_string(),
        }
    }
}
