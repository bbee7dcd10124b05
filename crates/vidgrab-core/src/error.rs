//! Error types for vidgrab core operations.

use std::path::PathBuf;
use thiserror::Error;

use crate::session::{SessionId, SessionState};

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in vidgrab core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The URL is malformed or no extractor recognises it.
    #[error("Unsupported URL: {0}")]
    UnsupportedUrl(String),

    /// No stream matched the requested format expression.
    #[error("No matching format: {0}")]
    NoMatchingFormat(String),

    /// The transfer failed (network, extractor, or I/O inside the engine).
    #[error("Transfer failed: {0}")]
    TransferFailed(String),

    /// The download was cancelled by the caller.
    #[error("Download cancelled")]
    Cancelled,

    /// The muxer (ffmpeg) is required but could not be found or run.
    #[error("Muxer unavailable: {0}")]
    MuxerUnavailable(String),

    /// The extraction engine binary is missing or unusable.
    #[error("Extraction engine unavailable: {0}")]
    EngineUnavailable(String),

    /// The history log could not be written; the in-memory state still applies.
    #[error("History persistence degraded at {path}: {reason}")]
    PersistenceDegraded {
        /// History file that failed to save.
        path: PathBuf,
        /// Underlying failure.
        reason: String,
    },

    /// An operation was attempted in a session state that forbids it.
    #[error("Session {id} cannot {action} while {state}")]
    InvalidSessionState {
        /// Session identifier.
        id: SessionId,
        /// State the session was in.
        state: SessionState,
        /// Rejected action.
        action: &'static str,
    },

    /// A quality label could not be parsed.
    #[error("Invalid quality: {0}")]
    InvalidQuality(String),

    /// File system operation failed.
    #[error("File system error at {path}: {message}")]
    FileSystem {
        /// Path where the error occurred.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a file system error for `path`.
    pub fn file_system(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::FileSystem {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Whether this error represents a user cancellation rather than a failure.
    #[must_use]
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::UnsupportedUrl("ftp://example.com".to_string());
        assert_eq!(err.to_string(), "Unsupported URL: ftp://example.com");
    }

    #[test]
    fn test_invalid_session_state_display() {
        let err = Error::InvalidSessionState {
            id: 7,
            state: SessionState::Cancelled,
            action: "start",
        };
        assert_eq!(err.to_string(), "Session 7 cannot start while cancelled");
    }

    #[test]
    fn test_persistence_degraded_display() {
        let err = Error::PersistenceDegraded {
            path: PathBuf::from("/tmp/history.json"),
            reason: "disk full".to_string(),
        };
        assert!(err.to_string().contains("/tmp/history.json"));
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn test_is_cancellation() {
        assert!(Error::Cancelled.is_cancellation());
        assert!(!Error::TransferFailed("reset".to_string()).is_cancellation());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
