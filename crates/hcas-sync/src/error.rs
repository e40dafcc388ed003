use std::path::PathBuf;

use hcas_types::{ContentHash, TypeError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Network-level failure: connect, timeout, broken body.
    #[error("transport error: {0}")]
    Transport(String),

    /// The remote answered with a non-success status.
    #[error("{operation} failed with status {status}: {body}")]
    Status {
        operation: String,
        status: u16,
        body: String,
    },

    #[error("upload of {path} failed: {reason}")]
    UploadFailure { path: String, reason: String },

    /// Fewer files were confirmed than were enumerated; nothing was published.
    #[error("{failed} of {total} files failed to upload")]
    Incomplete { failed: usize, total: usize },

    #[error("remote hash {remote} for {path} does not match local hash {local}")]
    HashMismatch {
        path: String,
        local: ContentHash,
        remote: ContentHash,
    },

    #[error("no files to sync under {}", .0.display())]
    EmptyTree(PathBuf),

    #[error("distribution {0} not found")]
    DistroNotFound(ContentHash),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("worker thread panicked")]
    WorkerPanicked,

    #[error(transparent)]
    Invalid(#[from] TypeError),

    #[error("store error: {0}")]
    Store(#[from] hcas_store::StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// Transport failures and 5xx answers are worth another attempt; 4xx are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status >= 500,
            Self::Store(hcas_store::StoreError::LockTimeout { .. }) => true,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
