//! Error types for sweeps and their collaborators.

use thiserror::Error;

/// Errors that abort a sweep.
///
/// Failures of individual API requests never show up here: the page fetcher
/// and batch fetcher absorb them. What remains are failures of the local
/// collaborators that make progress durable.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("State store error: {0}")]
    State(String),

    #[error("Bundle sink error: {0}")]
    Sink(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for sweep operations.
pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SyncError::State("state.json is read-only".to_string());
        assert!(err.to_string().contains("state.json is read-only"));

        let err = SyncError::Sink("disk full".to_string());
        assert_eq!(err.to_string(), "Bundle sink error: disk full");
    }

    #[test]
    fn test_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: SyncError = io.into();
        assert!(matches!(err, SyncError::Io(_)));
    }
}
