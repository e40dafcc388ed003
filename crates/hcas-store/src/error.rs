use std::path::PathBuf;

use hcas_types::{ContentHash, TypeError};

/// Errors from storage engine operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested blob, distribution or label is absent.
    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    /// An advisory lock was not acquired within its bounded wait.
    #[error("timed out after {timeout_ms}ms waiting for lock on {}", path.display())]
    LockTimeout { path: PathBuf, timeout_ms: u64 },

    /// A manifest references a blob the store does not hold.
    #[error("manifest entry {path} references missing blob {hash}")]
    MissingBlob { path: String, hash: ContentHash },

    /// Manifest body, hash or label failed validation.
    #[error(transparent)]
    Invalid(#[from] TypeError),

    /// The site builder could not render a configuration.
    #[error("site builder failed: {0}")]
    SiteBuilder(String),

    /// Serialization or deserialization failure of a persisted record.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An in-memory lock was poisoned by a panicking writer.
    #[error("in-memory store lock poisoned")]
    Poisoned,
}

impl StoreError {
    pub fn not_found(kind: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            kind,
            key: key.to_string(),
        }
    }

    /// Whether the error was caused by client input rather than the backend.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::Invalid(_) | Self::MissingBlob { .. })
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
