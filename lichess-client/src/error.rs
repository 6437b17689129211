//! Error types for the Lichess client

use thiserror::Error;

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limited by server")]
    RateLimited,

    #[error("Server error: HTTP {0}")]
    Server(u16),

    #[error("Request rejected (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Challenge declined: {0}")]
    ChallengeDeclined(String),

    #[error("Server returned invalid data: {0}")]
    InvalidData(String),

    #[error("Game stream closed")]
    StreamClosed,

    #[error("Mock response not configured for: {0}")]
    NotConfigured(String),
}

impl ClientError {
    /// Errors worth retrying with backoff. Everything else is a definite
    /// answer from the server.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::RateLimited | Self::Server(_) | Self::StreamClosed
        )
    }
}
