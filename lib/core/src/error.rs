use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("No valid (K, L) for num_hash={num_hash} at threshold {threshold}")]
    NoValidParameters { num_hash: usize, threshold: f64 },

    #[error("Forest queried before index() was called")]
    NotIndexed,

    #[error("Forest is already indexed; rebuild to add more keys")]
    AlreadyIndexed,

    #[error("Invalid signature length: expected at least {expected}, got {actual}")]
    SignatureLength { expected: usize, actual: usize },

    #[error("Invalid vector dimension: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Malformed column key: {0}")]
    MalformedColumnKey(String),

    #[error("Sketch file not found: {0}")]
    MissingSketch(PathBuf),

    #[error("Malformed sketch {path}: {reason}")]
    MalformedSketch { path: PathBuf, reason: String },

    #[error("Search worker failed: {0}")]
    Worker(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Errors that only invalidate a single column or match. Callers skip the
    /// offending item and keep going; everything else aborts the operation.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::MalformedColumnKey(_)
                | Error::MissingSketch(_)
                | Error::MalformedSketch { .. }
                | Error::SignatureLength { .. }
                | Error::DimensionMismatch { .. }
        )
    }
}
