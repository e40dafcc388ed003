//! Advisory per-path locks with a bounded wait.
//!
//! Locks are `flock(2)` locks on files under the store's `locks/` directory,
//! never on the guarded object itself, so existence checks and readers do not
//! observe lock files as content. A lock is released when its guard drops.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use tracing::trace;

use crate::config::LockConfig;
use crate::error::{StoreError, StoreResult};

const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Held advisory lock. Dropping it releases the lock.
#[derive(Debug)]
pub struct PathLock {
    path: PathBuf,
    file: File,
}

impl PathLock {
    /// Acquire an exclusive lock on `path`, polling until `timeout` elapses.
    ///
    /// The lock file is created if missing. No retry happens after the
    /// deadline; the caller gets [`StoreError::LockTimeout`].
    pub fn acquire(path: &Path, timeout: Duration) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;

        let deadline = Instant::now() + timeout;
        loop {
            if try_lock_exclusive(&file)? {
                trace!(path = %path.display(), "lock acquired");
                return Ok(Self {
                    path: path.to_path_buf(),
                    file,
                });
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(StoreError::LockTimeout {
                    path: path.to_path_buf(),
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            thread::sleep(POLL_INTERVAL.min(deadline - now));
        }
    }

    /// Acquire according to `config`; `None` when locking is disabled.
    pub fn acquire_with(path: &Path, config: &LockConfig) -> StoreResult<Option<Self>> {
        if !config.enabled {
            return Ok(None);
        }
        Self::acquire(path, config.timeout()).map(Some)
    }

    /// The lock file held.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PathLock {
    fn drop(&mut self) {
        unlock(&self.file);
        trace!(path = %self.path.display(), "lock released");
    }
}

#[cfg(unix)]
fn try_lock_exclusive(file: &File) -> io::Result<bool> {
    use nix::fcntl::{flock, FlockArg};
    use std::os::unix::io::AsRawFd;

    match flock(file.as_raw_fd(), FlockArg::LockExclusiveNonblock) {
        Ok(()) => Ok(true),
        Err(nix::errno::Errno::EWOULDBLOCK) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(unix)]
fn unlock(file: &File) {
    use nix::fcntl::{flock, FlockArg};
    use std::os::unix::io::AsRawFd;

    let _ = flock(file.as_raw_fd(), FlockArg::Unlock);
}

// Without flock the store runs unlocked, as with `LockConfig::enabled = false`.
#[cfg(not(unix))]
fn try_lock_exclusive(_file: &File) -> io::Result<bool> {
    Ok(true)
}

#[cfg(not(unix))]
fn unlock(_file: &File) {}
