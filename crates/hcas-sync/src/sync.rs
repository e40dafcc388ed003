use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use chrono::Utc;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use hcas_crypto::ContentHasher;
use hcas_types::{ContentHash, Manifest, ManifestEntry};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::error::{SyncError, SyncResult};
use crate::transport::CasTransport;
use crate::types::{DistroReport, FileReport, LabelReport, SyncOptions, SyncReport};

struct Job {
    relative: String,
    absolute: PathBuf,
}

struct Outcome {
    path: String,
    result: SyncResult<FileReport>,
}

/// Uploads a directory tree as one distribution.
///
/// Regular files are hashed locally, checked for dedup and uploaded by a fixed
/// pool of worker threads. The manifest is only published once every file is
/// confirmed; a single failed file fails the run.
pub struct Synchronizer {
    transport: Arc<dyn CasTransport>,
    hasher: ContentHasher,
    options: SyncOptions,
}

impl Synchronizer {
    pub fn new(transport: Arc<dyn CasTransport>, hasher: ContentHasher, options: SyncOptions) -> Self {
        Self {
            transport,
            hasher,
            options,
        }
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// One full pass: walk, upload, publish, then move the label if set.
    pub fn run(&self) -> SyncResult<SyncReport> {
        let started = Instant::now();
        let timestamp = Utc::now();

        let mut files = self.upload_tree()?;
        files.sort_by(|a, b| a.path.cmp(&b.path));

        let publish_started = Instant::now();
        let entries = files
            .iter()
            .map(|f| ManifestEntry::new(f.path.clone(), f.hash))
            .collect();
        let manifest = Manifest::sorted(entries)?;
        let distro = self.transport.put_distro(&manifest)?;
        let distro = DistroReport {
            hash: distro,
            duration_ms: elapsed_ms(publish_started),
        };
        info!(distro = %distro.hash, files = files.len(), "distribution published");

        let label = match &self.options.label {
            Some(label) => {
                self.transport.set_label(label, &distro.hash)?;
                info!(label = %label, distro = %distro.hash, "label updated");
                Some(LabelReport {
                    label: label.clone(),
                    hash: distro.hash,
                })
            }
            None => None,
        };

        Ok(SyncReport {
            timestamp,
            files,
            distro,
            label,
            duration_ms: elapsed_ms(started),
        })
    }

    /// Run up to `1 + retries` times, re-walking the tree on each attempt.
    ///
    /// Only transient failures and incomplete uploads are retried; invalid
    /// trees and client errors fail on the first attempt.
    pub fn run_with_retries(&self, retries: u32) -> SyncResult<SyncReport> {
        let mut attempt = 0;
        loop {
            match self.run() {
                Ok(report) => return Ok(report),
                Err(err) if attempt < retries && worth_retrying(&err) => {
                    attempt += 1;
                    warn!(attempt, retries, error = %err, "sync failed; retrying");
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn upload_tree(&self) -> SyncResult<Vec<FileReport>> {
        let workers = self.options.workers.max(1);
        let (job_tx, job_rx) = bounded::<Job>(workers);
        let (result_tx, result_rx) = unbounded::<Outcome>();

        let enumerated = thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|worker| {
                    let jobs = job_rx.clone();
                    let results = result_tx.clone();
                    scope.spawn(move || self.work(worker, jobs, results))
                })
                .collect();
            drop(job_rx);
            drop(result_tx);
            debug!(workers, "workers started");

            let walked = self.enumerate(&job_tx);
            drop(job_tx);

            let mut panicked = false;
            for handle in handles {
                panicked |= handle.join().is_err();
            }
            if panicked {
                return Err(SyncError::WorkerPanicked);
            }
            walked
        })?;

        if enumerated == 0 {
            return Err(SyncError::EmptyTree(self.options.root.clone()));
        }

        let mut files = Vec::with_capacity(enumerated);
        for outcome in result_rx.iter().take(enumerated) {
            match outcome.result {
                Ok(report) => files.push(report),
                Err(err) => debug!(path = %outcome.path, error = %err, "upload failed"),
            }
        }
        if files.len() < enumerated {
            error!(uploaded = files.len(), total = enumerated, "failed to upload files");
            return Err(SyncError::Incomplete {
                failed: enumerated - files.len(),
                total: enumerated,
            });
        }
        debug!(files = files.len(), "all uploads confirmed");
        Ok(files)
    }

    /// Walk the root, queueing one job per file. Blocks when the queue is full.
    fn enumerate(&self, jobs: &Sender<Job>) -> SyncResult<usize> {
        let root = &self.options.root;
        let mut count = 0;
        for entry in WalkDir::new(root).follow_links(false) {
            let entry = entry?;
            let is_file = entry.file_type().is_file()
                || (entry.path_is_symlink() && entry.path().is_file());
            if !is_file {
                continue;
            }
            let relative = relative_path(root, entry.path())?;
            debug!(path = %relative, "queued");
            jobs.send(Job {
                relative,
                absolute: entry.into_path(),
            })
            .map_err(|_| SyncError::WorkerPanicked)?;
            count += 1;
        }
        Ok(count)
    }

    fn work(&self, worker: usize, jobs: Receiver<Job>, results: Sender<Outcome>) {
        for job in jobs {
            let result = self.upload(&job);
            if let Err(err) = &result {
                error!(worker, path = %job.relative, error = %err, "failed to upload file");
            }
            // The driver holds the receiver until every worker has exited.
            let _ = results.send(Outcome {
                path: job.relative,
                result,
            });
        }
        debug!(worker, "worker finished");
    }

    fn upload(&self, job: &Job) -> SyncResult<FileReport> {
        let started = Instant::now();
        let data = fs::read(&job.absolute)?;
        let hash = self.hasher.hash(&data);

        let exists = self.transport.has_file(&hash)?;
        if !exists {
            let remote = self.transport.put_file(&data).map_err(|e| SyncError::UploadFailure {
                path: job.relative.clone(),
                reason: e.to_string(),
            })?;
            if remote != hash {
                return Err(SyncError::HashMismatch {
                    path: job.relative.clone(),
                    local: hash,
                    remote,
                });
            }
        }
        Ok(FileReport {
            path: job.relative.clone(),
            hash,
            exists,
            duration_ms: elapsed_ms(started),
        })
    }
}

/// Point `label` at an existing distribution, retrying the label write.
///
/// Fails without writing if the distribution is unknown to the remote.
pub fn set_label_checked(
    transport: &dyn CasTransport,
    label: &str,
    hash: &ContentHash,
    retries: u32,
) -> SyncResult<()> {
    let mut attempt = 0;
    loop {
        if !transport.has_distro(hash)? {
            return Err(SyncError::DistroNotFound(*hash));
        }
        match transport.set_label(label, hash) {
            Ok(()) => return Ok(()),
            Err(err) if attempt < retries => {
                attempt += 1;
                warn!(label, hash = %hash, attempt, error = %err, "label update failed; retrying");
            }
            Err(err) => return Err(err),
        }
    }
}

fn worth_retrying(err: &SyncError) -> bool {
    err.is_retryable() || matches!(err, SyncError::Incomplete { .. })
}

/// `/`-joined path of `path` below `root`.
fn relative_path(root: &Path, path: &Path) -> SyncResult<String> {
    let relative = path
        .strip_prefix(root)
        .map_err(|_| SyncError::Config(format!("{} is outside the sync root", path.display())))?;
    let parts = relative
        .components()
        .map(|c| {
            c.as_os_str()
                .to_str()
                .ok_or_else(|| SyncError::Config(format!("non UTF-8 path {}", path.display())))
        })
        .collect::<SyncResult<Vec<_>>>()?;
    Ok(parts.join("/"))
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}
