//! Error types for the table cache
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache adapter, its store and its sweeper.
#[derive(Error, Debug)]
pub enum CacheError {
    /// No row exists for the key. Mapped to `None` on the request path.
    #[error("Entity not found in segment \"{segment}\" id \"{id}\"")]
    NotFound { segment: String, id: String },

    /// The value could not be encoded for storage
    #[error("Failed to serialize value: {0}")]
    Serialization(#[source] serde_json::Error),

    /// A stored row could not be decoded
    #[error("Bad value content in segment \"{segment}\" id \"{id}\": {reason}")]
    CorruptRecord {
        segment: String,
        id: String,
        reason: String,
    },

    /// Failure reported by the backing table store
    #[error("Backend error ({status} {code}): {message}")]
    Backend {
        status: u16,
        code: String,
        message: String,
    },

    /// The store refused a batch before applying any of it
    #[error("Batch rejected for segment \"{segment}\": {reason}")]
    BatchRejected { segment: String, reason: String },

    /// Invalid construction options
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Segment name rejected by `validate_segment_name`
    #[error("Invalid segment name: {0}")]
    InvalidSegment(String),

    /// Operation attempted before `connect()` or after `disconnect()`
    #[error("Connection not started")]
    NotStarted,

    /// A `collected` observer failed while handling a sweep result
    #[error("Collected handler failed: {0}")]
    Handler(String),
}

impl CacheError {
    /// Shorthand for a backend failure.
    pub fn backend(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        CacheError::Backend {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    /// Returns true for backend-side failures worth retrying on the next tick:
    /// 5xx-class responses and throttling (429).
    pub fn is_transient(&self) -> bool {
        match self {
            CacheError::Backend { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Returns true if the error is the store's row-not-found condition.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::NotFound { .. })
    }
}

// == Sweep Error ==
/// A failed sweep tick, classified for the retry-vs-stop decision.
#[derive(Error, Debug)]
pub enum SweepError {
    /// Recoverable backend failure; the loop reschedules.
    #[error("transient sweep failure: {0}")]
    Transient(#[source] CacheError),

    /// Anything else; the loop stops until restarted.
    #[error("fatal sweep failure: {0}")]
    Fatal(#[source] CacheError),
}

impl SweepError {
    /// Classifies a tick failure.
    pub fn classify(err: CacheError) -> Self {
        if err.is_transient() {
            SweepError::Transient(err)
        } else {
            SweepError::Fatal(err)
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, SweepError::Fatal(_))
    }

    /// The underlying cache error.
    pub fn inner(&self) -> &CacheError {
        match self {
            SweepError::Transient(err) | SweepError::Fatal(err) => err,
        }
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::NotFound { .. } => StatusCode::NOT_FOUND,
            CacheError::Serialization(_) | CacheError::InvalidSegment(_) => {
                StatusCode::BAD_REQUEST
            }
            CacheError::NotStarted => StatusCode::SERVICE_UNAVAILABLE,
            CacheError::Backend { status, .. } if *status == 429 || *status >= 500 => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the table cache.
pub type Result<T> = std::result::Result<T, CacheError>;
