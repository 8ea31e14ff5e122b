//! Error types for the nowcast rainfall crates.

use thiserror::Error;

/// Result type alias using NowcastError.
pub type NowcastResult<T> = Result<T, NowcastError>;

/// Primary error type for tile decoding operations.
#[derive(Debug, Error)]
pub enum NowcastError {
    // === Time resolution errors ===
    #[error("Time index {kind} unavailable: {message}")]
    TimeIndexUnavailable { kind: String, message: String },

    #[error("Time index {0} is empty")]
    EmptyTimeIndex(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    // === Tile retrieval errors ===
    #[error("All tile URLs failed for {tile}: {last_error}")]
    TileFetchFailed { tile: String, last_error: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request timeout: {0}")]
    Timeout(String),

    // === Decoding errors ===
    #[error("Tile decode failed: {0}")]
    DecodeError(String),

    #[error("Unknown aggregation method: {0}")]
    UnknownMethod(String),

    // === Infrastructure errors ===
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl NowcastError {
    /// Whether the failure came from time-index resolution.
    pub fn is_time_resolution(&self) -> bool {
        matches!(
            self,
            NowcastError::TimeIndexUnavailable { .. }
                | NowcastError::EmptyTimeIndex(_)
                | NowcastError::InvalidTimestamp(_)
        )
    }

    /// Whether a request with this failure may succeed if simply retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, NowcastError::Transport(_) | NowcastError::Timeout(_))
    }
}

// Conversion from common error types
impl From<std::io::Error> for NowcastError {
    fn from(err: std::io::Error) -> Self {
        NowcastError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for NowcastError {
    fn from(err: serde_json::Error) -> Self {
        NowcastError::InternalError(format!("JSON error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_resolution_classification() {
        assert!(NowcastError::EmptyTimeIndex("N1".into()).is_time_resolution());
        assert!(NowcastError::InvalidTimestamp("x".into()).is_time_resolution());
        assert!(!NowcastError::Transport("reset".into()).is_time_resolution());
    }

    #[test]
    fn test_transient_classification() {
        assert!(NowcastError::Timeout("10s".into()).is_transient());
        assert!(!NowcastError::TileFetchFailed {
            tile: "10/907/405".into(),
            last_error: "HTTP 500".into()
        }
        .is_transient());
    }
}
