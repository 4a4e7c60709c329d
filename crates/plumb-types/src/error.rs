//! Error kinds shared by every plumb component.

use thiserror::Error;

/// Result type for plumbing operations.
pub type PlumbResult<T> = Result<T, PlumbError>;

/// Plumbing errors.
///
/// Registry-mutating operations return these synchronously. Delivery-path
/// failures (slow readers, crashed vias, dropped remote peers) are logged
/// and never reach the writer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlumbError {
    /// Malformed argument or an operation targeting a pipe that does not exist.
    #[error("{0}")]
    Validation(String),
    /// A specifically named pipe or pipeline does not exist.
    #[error("no such pipe or pipeline: {0}")]
    NotFound(String),
    /// A program stage or via failed to start.
    #[error("spawn failed: {0}")]
    Spawn(String),
    /// Remote attachment I/O failed.
    #[error("network error: {0}")]
    Network(String),
    /// The pipe behind a handle has been deleted.
    #[error("pipe closed: {0}")]
    Closed(String),
    #[error("io error: {0}")]
    Io(String),
}

impl PlumbError {
    /// Shorthand for a validation error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        PlumbError::Validation(msg.into())
    }
}

impl From<std::io::Error> for PlumbError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::NotConnected
            | ErrorKind::TimedOut => PlumbError::Network(err.to_string()),
            _ => PlumbError::Io(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for PlumbError {
    fn from(err: serde_json::Error) -> Self {
        PlumbError::Network(format!("malformed frame: {err}"))
    }
}
