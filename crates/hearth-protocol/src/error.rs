//! Error taxonomy for every operation that crosses the socket.

use std::time::Duration;

use thiserror::Error;

/// Coarse classification of an [`HAError`], for callers that only need to
/// branch on the failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The backend rejected the access token. Never retried.
    AuthInvalid,
    /// Socket-level failure: connect error, broken pipe, or the socket
    /// closed while a request was still waiting for its answer.
    TransportError,
    /// No matching response (or handshake completion) within the deadline.
    Timeout,
    /// The backend answered the request with `success: false`, an HTTP
    /// endpoint returned a non-2xx status, or a successful result did not
    /// have the expected shape (`invalid_result`).
    ServiceError,
    /// The connection was not authenticated; nothing was sent.
    NotConnected,
}

/// Errors surfaced by the connection and the service façade.
#[derive(Debug, Clone, Error)]
pub enum HAError {
    #[error("authentication rejected: {message}")]
    AuthInvalid { message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("{operation} timed out after {}ms", elapsed.as_millis())]
    Timeout {
        operation: String,
        elapsed: Duration,
    },

    #[error("service error [{code}]: {message}")]
    Service { code: String, message: String },

    #[error("not connected to Home Assistant")]
    NotConnected,
}

impl HAError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub fn timeout(operation: impl Into<String>, elapsed: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed,
        }
    }

    pub fn service(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Service {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AuthInvalid { .. } => ErrorKind::AuthInvalid,
            Self::Transport(_) => ErrorKind::TransportError,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Service { .. } => ErrorKind::ServiceError,
            Self::NotConnected => ErrorKind::NotConnected,
        }
    }

    /// Whether the reconnection controller may retry after this failure.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::AuthInvalid { .. })
    }
}

impl From<serde_json::Error> for HAError {
    fn from(err: serde_json::Error) -> Self {
        Self::Transport(format!("malformed frame: {err}"))
    }
}

/// Result alias used across the workspace.
pub type HAResult<T> = Result<T, HAError>;
