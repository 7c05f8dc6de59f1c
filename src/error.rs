use thiserror::Error;
use tracing::{error, warn};

/// Errors returned across the store worker boundary
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Clipboard history worker is not running")]
    WorkerUnavailable,

    #[error("Persistence failed: {0}")]
    Persistence(#[from] anyhow::Error),

    #[error("Failed to start clipboard history worker: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Errors the query server turns into JSON error responses
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiError {
    #[error("Malformed request line")]
    BadRequest,

    #[error("Missing or invalid item id")]
    MissingId,

    #[error("Only GET is supported")]
    MethodNotAllowed,

    #[error("No such route or item")]
    NotFound,

    #[error("Clipboard history is unavailable")]
    Unavailable,
}

impl ApiError {
    pub fn status(&self) -> u16 {
        match self {
            Self::BadRequest | Self::MissingId => 400,
            Self::MethodNotAllowed => 405,
            Self::NotFound => 404,
            Self::Unavailable => 503,
        }
    }

    /// Machine-readable code sent as `{"error": <code>}`
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest => "bad_request",
            Self::MissingId => "missing_id",
            Self::MethodNotAllowed => "method_not_allowed",
            Self::NotFound => "not_found",
            Self::Unavailable => "unavailable",
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(_: StoreError) -> Self {
        Self::Unavailable
    }
}

/// Extension trait for silent error logging with caller location tracking.
/// Use when the operation is recoverable and the caller can carry on.
///
/// # Examples
///
/// ```ignore
/// use cliphist::error::ResultExt;
///
/// // Keep the in-memory log even if the row could not be written
/// storage.update_pinned(id, pinned).log_err();
///
/// // Log as warning for expected failures
/// let cached = read_cache().warn_on_err();
/// ```
pub trait ResultExt<T> {
    /// Log error with caller location and return None. Use for recoverable failures.
    fn log_err(self) -> Option<T>;
    /// Log as warning with caller location and return None. Use for expected failures.
    fn warn_on_err(self) -> Option<T>;
}

impl<T, E: std::fmt::Debug> ResultExt<T> for std::result::Result<T, E> {
    #[track_caller]
    fn log_err(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(error) => {
                let caller = std::panic::Location::caller();
                error!(
                    error = ?error,
                    file = caller.file(),
                    line = caller.line(),
                    "Operation failed"
                );
                None
            }
        }
    }

    #[track_caller]
    fn warn_on_err(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(error) => {
                let caller = std::panic::Location::caller();
                warn!(
                    error = ?error,
                    file = caller.file(),
                    line = caller.line(),
                    "Operation had warning"
                );
                None
            }
        }
    }
}
