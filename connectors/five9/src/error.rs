//! Five9 connector error types.

use thiserror::Error;

/// Why a live connection was declared lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossCause {
    /// Consecutive heartbeats went unacknowledged.
    HeartbeatTimeout { skipped_beats: u32 },
    /// The remote end closed the socket with a revivable close code.
    ForcedClose { code: u16 },
    /// The socket ended without a revivable close code.
    UnexpectedClose { code: Option<u16> },
}

impl std::fmt::Display for LossCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HeartbeatTimeout { skipped_beats } => {
                write!(f, "heartbeat timeout after {skipped_beats} unacknowledged beats")
            }
            Self::ForcedClose { code } => write!(f, "forcibly closed by remote (code {code})"),
            Self::UnexpectedClose { code: Some(code) } => {
                write!(f, "unexpected close (code {code})")
            }
            Self::UnexpectedClose { code: None } => write!(f, "unexpected close (no close frame)"),
        }
    }
}

/// Five9 connector errors.
#[derive(Error, Debug)]
pub enum Five9Error {
    /// A required resource descriptor or setting is missing or invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A remote endpoint failed or answered with something unusable.
    #[error("Upstream error from {endpoint}: {message}")]
    Upstream {
        endpoint: String,
        status: Option<u16>,
        message: String,
    },

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Socket transport failure.
    #[error("Socket error: {0}")]
    Socket(String),

    /// The live connection was declared dead.
    #[error("Connection lost: {cause}")]
    ConnectionLost { cause: LossCause },

    /// The supervisor task is no longer running.
    #[error("Connection supervisor is not running")]
    SupervisorGone,
}

impl Five9Error {
    /// Build an upstream error for an endpoint.
    pub fn upstream(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Upstream {
            endpoint: endpoint.into(),
            status: None,
            message: message.into(),
        }
    }

    /// Check if this error is retryable.
    ///
    /// Configuration problems never heal on their own; everything that
    /// touches the network might.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Upstream { .. }
            | Self::Http(_)
            | Self::Json(_)
            | Self::Socket(_)
            | Self::ConnectionLost { .. } => true,
            Self::Configuration(_) | Self::SupervisorGone => false,
        }
    }
}

/// Result type for Five9 operations.
pub type Five9Result<T> = Result<T, Five9Error>;
