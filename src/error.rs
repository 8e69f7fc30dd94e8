//! Error taxonomy for the audio analysis core
//!
//! Two failure families with different retry semantics:
//!
//! - [`ValidationError`] — the upload itself is unacceptable. Surfaced to the
//!   caller as a user-facing rejection, never retried.
//! - [`ProcessingError`] — something went wrong while working on an accepted
//!   upload (decode failure, degenerate signal state). The external scheduler
//!   retries these with backoff before marking the record failed.
//!
//! [`PipelineError`] is the union returned by the orchestrator;
//! [`PipelineError::is_retryable`] lets the scheduler branch without matching
//! on message strings.

use std::path::PathBuf;
use thiserror::Error;

/// Admissibility failures. Never retried.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Input path does not exist
    #[error("Audio file not found: {0}")]
    NotFound(PathBuf),

    /// Zero-byte file
    #[error("Audio file is empty")]
    Empty,

    /// File exceeds the configured size ceiling
    #[error("Audio file too large: {size} bytes (max {max})")]
    TooLarge { size: u64, max: u64 },

    /// Decoded duration below the configured minimum
    #[error("Audio too short: {duration:.3}s (min {min:.3}s)")]
    TooShort { duration: f64, min: f64 },

    /// Extension/container outside the allow-list
    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    /// Duration above the configured maximum
    #[error("Audio duration {duration:.1}s exceeds maximum {max:.1}s")]
    DurationExceeded { duration: f64, max: f64 },
}

/// Processing failures on an accepted upload. Retried by the caller.
#[derive(Debug, Error)]
pub enum ProcessingError {
    /// Container or codec could not be decoded
    #[error("Failed to decode audio: {0}")]
    Decode(String),

    /// Unsupported container/codec encountered mid-processing
    #[error("Unsupported container or codec: {0}")]
    Format(String),

    /// Signal state violates an operation's preconditions
    #[error("Invalid signal: {0}")]
    InvalidSignal(String),

    /// Operation called on a zero-length sample buffer
    #[error("Empty signal")]
    EmptySignal,

    /// Strategy name outside the closed method set
    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    /// I/O failure while reading audio data
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage collaborator failures (download/upload boundary).
#[derive(Debug, Error)]
pub enum StorageError {
    /// Key not present in the backing store
    #[error("Storage key not found: {0}")]
    KeyNotFound(String),

    /// Transport or backend failure
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Top-level pipeline error returned to the calling scheduler.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Processing(#[from] ProcessingError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The blocking analysis task panicked or was cancelled.
    #[error("Analysis task failed: {0}")]
    Task(String),
}

impl PipelineError {
    /// Whether the external scheduler should retry with backoff.
    ///
    /// Validation rejections are final; processing and storage failures are
    /// assumed transient until the scheduler exhausts its attempt budget.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, PipelineError::Validation(_))
    }
}

/// Result alias for processing operations.
pub type Result<T> = std::result::Result<T, ProcessingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_not_retryable() {
        let err = PipelineError::Validation(ValidationError::Empty);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_processing_errors_retryable() {
        let err = PipelineError::Processing(ProcessingError::Decode("bad header".into()));
        assert!(err.is_retryable());

        let err = PipelineError::Storage(StorageError::Backend("timeout".into()));
        assert!(err.is_retryable());
    }
}
