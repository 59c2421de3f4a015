//! Error types for the TrackView environment abstraction.

use thiserror::Error;

/// Errors that can occur when talking to the outside world.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EnvError {
    /// Transport failed before a response arrived (DNS, refused, reset)
    #[error("connection failed: {0}")]
    Connection(String),

    /// Backend answered with a non-2xx status
    #[error("{message}")]
    Backend {
        status: u16,
        message: String,
    },

    /// Routing service rejected or could not answer a request
    #[error("Routing error: {0}")]
    Routing(String),

    /// Response body could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Operation timed out
    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

impl EnvError {
    /// Creates a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a backend error, falling back to the status line when the
    /// body carried no message.
    pub fn backend(status: u16, message: Option<String>) -> Self {
        let message = message
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| format!("HTTP error! status: {}", status));
        Self::Backend { status, message }
    }

    /// Creates a routing error.
    pub fn routing(msg: impl std::fmt::Display) -> Self {
        Self::Routing(msg.to_string())
    }
}
