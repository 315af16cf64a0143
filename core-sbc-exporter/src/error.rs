//! Error types for scraping an SBC.

use thiserror::Error;

use crate::parser::ParseError;

/// Errors raised while talking to an SBC over the event socket.
///
/// `Connection`, `Auth` and failures during connect/authenticate end the
/// scrape with `up 0`. Everything raised by an individual query is logged
/// and only drops that query's samples.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Peer unreachable or connection refused.
    #[error("Connection to {target} failed: {message}")]
    Connection { target: String, message: String },

    /// Password rejected by the SBC.
    #[error("Authentication rejected: {0}")]
    Auth(String),

    /// Malformed framing or unexpected reply.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Deadline exceeded during the named step.
    #[error("Timed out during {0}")]
    Timeout(String),

    /// The SBC answered the command with `-ERR`.
    #[error("Command rejected: {0}")]
    Command(String),

    /// Body could not be turned into samples.
    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl ScrapeError {
    /// Create a protocol error.
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Whether the connection can no longer be trusted to be frame-aligned.
    pub fn desynchronizes(&self) -> bool {
        matches!(self, Self::Protocol(_) | Self::Timeout(_))
    }
}

/// Result type alias using [`ScrapeError`].
pub type Result<T> = std::result::Result<T, ScrapeError>;
