use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capabilities::KvError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Network,
    Validation,
    Submission,
    Cache,
}

impl ErrorKind {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Network => "NETWORK_ERROR",
            Self::Validation => "VALIDATION_ERROR",
            Self::Submission => "SUBMISSION_ERROR",
            Self::Cache => "CACHE_ERROR",
        }
    }

    /// Network failures heal on the next reconnect; the rest need the user
    /// (validation) or are dropped (submission, cache).
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Network)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkError {
    #[error("remote log unavailable: {0}")]
    Unavailable(String),

    #[error("subscription dropped: {0}")]
    Dropped(String),

    #[error("remote log timed out")]
    Timeout,
}

#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
pub enum ValidationError {
    #[error("message has no text, image or location")]
    EmptyDraft,

    #[error("message carries more than one payload")]
    MultiplePayloads,

    #[error("text too long ({len} > {max})")]
    TextTooLong { len: usize, max: usize },

    #[error("image reference is not a valid URL: {0}")]
    InvalidImageRef(String),

    #[error("invalid coordinate: latitude={latitude}, longitude={longitude}")]
    InvalidCoordinate { latitude: f64, longitude: f64 },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SubmissionError {
    #[error("message could not be sent: {0}")]
    Transport(#[from] NetworkError),
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SubmitError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Submission(#[from] SubmissionError),
}

impl SubmitError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SubmitError::Validation(_) => ErrorKind::Validation,
            SubmitError::Submission(_) => ErrorKind::Submission,
        }
    }
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("storage error: {0}")]
    Storage(#[from] KvError),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("corrupted cache entry: {reason}")]
    Corrupted { reason: &'static str },

    #[error("integrity check failed: expected {expected}, got {actual}")]
    IntegrityCheckFailed { expected: String, actual: String },

    #[error("schema version {found} is newer than supported {max}")]
    FutureSchema { found: u32, max: u32 },

    #[error("unknown schema version: {0}")]
    UnknownSchema(u32),

    #[error("cache entry too large: {size} bytes, max {max}")]
    TooLarge { size: usize, max: usize },
}

impl From<ciborium::de::Error<std::io::Error>> for CacheError {
    fn from(e: ciborium::de::Error<std::io::Error>) -> Self {
        CacheError::Serialization(e.to_string())
    }
}

impl From<ciborium::ser::Error<std::io::Error>> for CacheError {
    fn from(e: ciborium::ser::Error<std::io::Error>) -> Self {
        CacheError::Serialization(e.to_string())
    }
}

/// Non-blocking notification for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Notice {
    ConnectionLost,
    Failure { kind: ErrorKind, message: String },
}

impl Notice {
    pub fn failure(kind: ErrorKind, error: &impl std::fmt::Display) -> Self {
        Notice::Failure {
            kind,
            message: error.to_string(),
        }
    }

    pub fn user_message(&self) -> &str {
        match self {
            Notice::ConnectionLost => "You are offline. Showing saved messages.",
            Notice::Failure { kind, .. } => match kind {
                ErrorKind::Network => "Unable to reach the chat service.",
                ErrorKind::Validation => "Please enter a message.",
                ErrorKind::Submission => "Message could not be sent.",
                ErrorKind::Cache => "Saved messages are unavailable.",
            },
        }
    }
}

impl From<&SubmitError> for Notice {
    fn from(error: &SubmitError) -> Self {
        Notice::failure(error.kind(), error)
    }
}
