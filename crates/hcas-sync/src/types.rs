use std::path::PathBuf;

use chrono::{DateTime, Utc};
use hcas_types::ContentHash;
use serde::{Deserialize, Serialize};

pub const DEFAULT_WORKERS: usize = 10;

/// What to sync and how wide to fan out.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncOptions {
    /// Directory whose regular files become the distribution.
    pub root: PathBuf,
    /// Label moved to the new distribution on success.
    pub label: Option<String>,
    /// Upload worker threads; also the job queue capacity.
    pub workers: usize,
}

impl SyncOptions {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            label: None,
            workers: DEFAULT_WORKERS,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }
}

/// Outcome of one uploaded file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReport {
    /// `/`-separated path relative to the sync root.
    pub path: String,
    pub hash: ContentHash,
    /// The dedup check found the blob; nothing was uploaded.
    pub exists: bool,
    pub duration_ms: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistroReport {
    pub hash: ContentHash,
    pub duration_ms: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelReport {
    pub label: String,
    pub hash: ContentHash,
}

/// Summary of a successful sync run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub timestamp: DateTime<Utc>,
    /// Sorted by path.
    pub files: Vec<FileReport>,
    pub distro: DistroReport,
    pub label: Option<LabelReport>,
    pub duration_ms: u64,
}

impl SyncReport {
    /// Files skipped because the remote already had them.
    pub fn deduplicated(&self) -> usize {
        self.files.iter().filter(|f| f.exists).count()
    }

    /// Files that had to be sent to the remote.
    pub fn uploaded(&self) -> usize {
        self.files.len() - self.deduplicated()
    }
}
