use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// A distribution manifest body that cannot be ingested as a whole.
    #[error("malformed manifest (line {line}): {reason}")]
    MalformedManifest { line: usize, reason: String },

    #[error("invalid label {name:?}: {reason}")]
    InvalidLabel { name: String, reason: String },
}

impl TypeError {
    pub(crate) fn malformed(line: usize, reason: impl Into<String>) -> Self {
        Self::MalformedManifest {
            line,
            reason: reason.into(),
        }
    }
}
