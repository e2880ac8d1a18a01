//! Error types for the engine.

use thiserror::Error;

/// Engine-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Malformed terrain configuration, detected before the render loop starts
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Recoverable rendering API failure
    #[error("Graphics error: {0}")]
    Graphics(String),

    /// The graphics context was lost; rendering cannot continue
    #[error("Graphics context lost")]
    ContextLost,

    /// The background patch worker stopped without being asked to
    #[error("Patch worker terminated unexpectedly")]
    WorkerTerminated,

    /// Internal bookkeeping no longer holds
    #[error("Invariant violated: {0}")]
    InvariantViolation(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
