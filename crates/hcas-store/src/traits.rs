use std::fmt;

use hcas_types::{ContentHash, Manifest};

use crate::error::StoreResult;

/// Outcome of storing a blob.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stored {
    /// The blob was written by this call.
    Created,
    /// Identical content was already present; nothing was written.
    AlreadyExists,
}

impl Stored {
    pub fn existed(self) -> bool {
        self == Self::AlreadyExists
    }
}

impl fmt::Display for Stored {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::AlreadyExists => write!(f, "already exists"),
        }
    }
}

/// Capability interface over a storage backend.
///
/// All implementations must satisfy these invariants:
/// - Blobs are immutable once written; storing the same hash twice is a no-op
///   reported as [`Stored::AlreadyExists`].
/// - A published distribution is immutable. Publishing the same root again,
///   including concurrently, succeeds without duplicating anything.
/// - Absent objects are `Ok(None)` / `Ok(false)`, never errors.
/// - Labels are last-write-wins pointers. Moving a label regenerates its
///   site configuration.
/// - Lock timeouts surface as `StoreError::LockTimeout` and are never retried
///   inside the store.
pub trait ContentStore: Send + Sync {
    /// Store a blob under its content hash.
    fn store(&self, hash: &ContentHash, data: &[u8]) -> StoreResult<Stored>;

    /// Blob bytes, or `None` if absent.
    fn get(&self, hash: &ContentHash) -> StoreResult<Option<Vec<u8>>>;

    /// Existence check used for dedup short-circuiting. Takes no lock.
    fn has(&self, hash: &ContentHash) -> StoreResult<bool>;

    /// Publish `manifest` as the distribution named `root`.
    ///
    /// Every referenced blob must already be stored.
    fn store_distro(&self, root: &ContentHash, manifest: &Manifest) -> StoreResult<()>;

    /// The manifest published under `root`, or `None`.
    fn get_distro(&self, root: &ContentHash) -> StoreResult<Option<Manifest>>;

    /// Whether a distribution with this root is published.
    fn has_distro(&self, root: &ContentHash) -> StoreResult<bool>;

    /// Point `label` at `hash` and regenerate the label's site configuration.
    fn store_label(&self, label: &str, hash: &ContentHash) -> StoreResult<()>;

    /// Current target of `label`, or `None` if never set.
    fn get_label(&self, label: &str) -> StoreResult<Option<ContentHash>>;

    /// Whether `label` has been set.
    fn has_label(&self, label: &str) -> StoreResult<bool>;

    /// Site configuration generated at the label's last update.
    fn site_config(&self, label: &str) -> StoreResult<Option<String>>;
}
