use thiserror::Error;

/// Result alias for detection-pass operations.
pub type Result<T> = std::result::Result<T, DetectError>;

/// Error taxonomy for a detection pass. Nothing is recovered locally:
/// every variant aborts the pass and bubbles to the invoker.
#[derive(Debug, Error)]
pub enum DetectError {
    /// Invalid configuration, raised at construction.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Malformed input record or invalid embedding.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Embedding service failure, with the offending batch index.
    #[error("embedding provider failed on batch {batch}: {message}")]
    Provider { batch: usize, message: String },

    /// Collaborator failure on fetch or save.
    #[error("storage operation failed: {0}")]
    Storage(String),

    /// Externally requested termination; no partial results surfaced.
    #[error("detection pass cancelled")]
    Cancelled,
}

impl DetectError {
    /// Short kind label used in CLI stderr lines.
    pub fn kind(&self) -> &'static str {
        match self {
            DetectError::Config(_) => "config",
            DetectError::Validation(_) => "validation",
            DetectError::Provider { .. } => "provider",
            DetectError::Storage(_) => "storage",
            DetectError::Cancelled => "cancelled",
        }
    }

    /// Distinct non-zero process exit code per error kind.
    pub fn exit_code(&self) -> i32 {
        match self {
            DetectError::Config(_) => 2,
            DetectError::Validation(_) => 3,
            DetectError::Provider { .. } => 4,
            DetectError::Storage(_) => 5,
            DetectError::Cancelled => 6,
        }
    }
}
