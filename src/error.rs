//! Error types shared across the messaging runtime and services.

use thiserror::Error;

/// Crate-wide error type.
///
/// Timeouts are deliberately absent: a receive or request that runs out of
/// time yields `Ok(None)`, not an error. `Fatal` wraps failures of the
/// underlying messaging library; the owning component surfaces it and stops.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0} used before initialize")]
    NotInitialized(&'static str),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("malformed payload: {0}")]
    Decode(String),

    #[error("message type not in registry: {0}")]
    UnknownType(String),

    #[error("connection rejected by authentication: {0}")]
    AuthDenied(String),

    #[error("send buffer full: {0}")]
    Backpressure(String),

    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("messaging library failure: {0}")]
    Fatal(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl From<zeromq::ZmqError> for Error {
    fn from(source: zeromq::ZmqError) -> Self {
        Error::Fatal(source.to_string())
    }
}

impl From<sqlx::Error> for Error {
    fn from(source: sqlx::Error) -> Self {
        Error::Fatal(source.to_string())
    }
}
