//! Filesystem backend.
//!
//! Layout under the store root:
//!
//! ```text
//! files/{h[0:2]}/{h[2:4]}/{h}   blob bytes
//! distros/{root}                manifest as a JSON array of `path:hash` lines
//! labels/{label}                distribution hash as hex text
//! site-configs/{label}.conf     generated serving configuration
//! locks/{kind}/{name}.lock      advisory lock files
//! ```
//!
//! Published distributions live under `sites_root/{root}` as a tree of
//! symlinks into `files/`.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hcas_types::{validate_label, ContentHash, Manifest};
use tracing::{debug, info, warn};

use crate::config::{LockConfig, StorageConfig};
use crate::error::{StoreError, StoreResult};
use crate::lock::PathLock;
use crate::site::SiteBuilder;
use crate::traits::{ContentStore, Stored};

const FILES_DIR: &str = "files";
const DISTROS_DIR: &str = "distros";
const LABELS_DIR: &str = "labels";
const SITE_CONFIGS_DIR: &str = "site-configs";
const LOCKS_DIR: &str = "locks";
const STAGING_PREFIX: &str = ".staging-";

pub struct FileSystemStore {
    root: PathBuf,
    sites_root: PathBuf,
    locks: LockConfig,
    site_builder: Arc<dyn SiteBuilder>,
}

impl FileSystemStore {
    /// Open (creating if needed) a store at the configured paths.
    pub fn open(config: &StorageConfig, site_builder: Arc<dyn SiteBuilder>) -> StoreResult<Self> {
        let StorageConfig { root, sites_root, locks } = config.prepare()?;
        for dir in [FILES_DIR, DISTROS_DIR, LABELS_DIR, SITE_CONFIGS_DIR, LOCKS_DIR] {
            fs::create_dir_all(root.join(dir))?;
        }
        info!(root = %root.display(), sites_root = %sites_root.display(), "opened filesystem store");
        Ok(Self {
            root,
            sites_root,
            locks,
            site_builder,
        })
    }

    /// Canonical store root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Canonical directory published trees live in.
    pub fn sites_root(&self) -> &Path {
        &self.sites_root
    }

    /// Sharded location of a blob: `files/{h[0..2]}/{h[2..4]}/{h}`.
    pub fn blob_path(&self, hash: &ContentHash) -> PathBuf {
        let (first, second) = hash.shards();
        self.root
            .join(FILES_DIR)
            .join(first)
            .join(second)
            .join(hash.to_hex())
    }

    /// Location of the persisted manifest for `root`.
    pub fn distro_path(&self, root: &ContentHash) -> PathBuf {
        self.root.join(DISTROS_DIR).join(root.to_hex())
    }

    /// Public directory a distribution is published to.
    pub fn site_path(&self, root: &ContentHash) -> PathBuf {
        self.sites_root.join(root.to_hex())
    }

    fn label_path(&self, label: &str) -> PathBuf {
        self.root.join(LABELS_DIR).join(label)
    }

    fn site_config_path(&self, label: &str) -> PathBuf {
        self.root.join(SITE_CONFIGS_DIR).join(format!("{label}.conf"))
    }

    fn lock_path(&self, kind: &str, name: &str) -> PathBuf {
        self.root
            .join(LOCKS_DIR)
            .join(kind)
            .join(format!("{name}.lock"))
    }

    fn lock(&self, kind: &str, name: &str) -> StoreResult<Option<PathLock>> {
        PathLock::acquire_with(&self.lock_path(kind, name), &self.locks)
    }

    /// Materialize `manifest` as a symlink tree under `dir`.
    fn stage_tree(&self, dir: &Path, manifest: &Manifest) -> StoreResult<()> {
        fs::create_dir(dir)?;
        for entry in manifest.entries() {
            let target = dir.join(&entry.path);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            link_blob(&self.blob_path(&entry.hash), &target)?;
        }
        Ok(())
    }

    fn persist_manifest(&self, root: &ContentHash, manifest: &Manifest) -> StoreResult<()> {
        let path = self.distro_path(root);
        if path.exists() {
            return Ok(());
        }
        let _guard = match self.lock(DISTROS_DIR, &root.to_hex()) {
            Ok(guard) => guard,
            Err(StoreError::LockTimeout { .. }) if path.exists() => {
                debug!(root = %root, "manifest written by a concurrent publisher");
                return Ok(());
            }
            Err(err) => return Err(err),
        };
        if path.exists() {
            return Ok(());
        }
        let body = serde_json::to_vec(&manifest.to_lines())?;
        write_atomic(&path, &body)?;
        Ok(())
    }

    /// Move the staged tree into place. An existing target is the same
    /// content by construction and counts as success.
    fn finalize_site(&self, root: &ContentHash, staged: &Path) -> StoreResult<()> {
        let target = self.site_path(root);
        if target.exists() {
            debug!(root = %root, "distribution already published; discarding staged tree");
            return Ok(());
        }
        let _guard = match self.lock("sites", &root.to_hex()) {
            Ok(guard) => guard,
            Err(StoreError::LockTimeout { .. }) if target.exists() => {
                debug!(root = %root, "publish race absorbed while waiting for lock");
                return Ok(());
            }
            Err(err) => return Err(err),
        };
        if target.exists() {
            debug!(root = %root, "distribution already published; discarding staged tree");
            return Ok(());
        }
        match fs::rename(staged, &target) {
            Ok(()) => Ok(()),
            Err(err) if target.exists() => {
                debug!(root = %root, error = %err, "publish race absorbed");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}

impl ContentStore for FileSystemStore {
    fn store(&self, hash: &ContentHash, data: &[u8]) -> StoreResult<Stored> {
        let path = self.blob_path(hash);
        if path.exists() {
            return Ok(Stored::AlreadyExists);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let _guard = match self.lock(FILES_DIR, &hash.to_hex()) {
            Ok(guard) => guard,
            Err(StoreError::LockTimeout { .. }) if path.exists() => return Ok(Stored::AlreadyExists),
            Err(err) => return Err(err),
        };
        if path.exists() {
            return Ok(Stored::AlreadyExists);
        }
        write_atomic(&path, data)?;
        debug!(hash = %hash, size = data.len(), "blob stored");
        Ok(Stored::Created)
    }

    // Objects appear by rename, so reads never see partial content and take no lock.
    fn get(&self, hash: &ContentHash) -> StoreResult<Option<Vec<u8>>> {
        read_optional(&self.blob_path(hash))
    }

    fn has(&self, hash: &ContentHash) -> StoreResult<bool> {
        Ok(self.blob_path(hash).is_file())
    }

    fn store_distro(&self, root: &ContentHash, manifest: &Manifest) -> StoreResult<()> {
        for entry in manifest.entries() {
            if !self.blob_path(&entry.hash).is_file() {
                return Err(StoreError::MissingBlob {
                    path: entry.path.clone(),
                    hash: entry.hash,
                });
            }
        }
        if self.distro_path(root).is_file() && self.site_path(root).is_dir() {
            debug!(root = %root, "distribution already published");
            return Ok(());
        }

        // Unique per call, so concurrent publishers of one root never share a build directory.
        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(&self.sites_root)?;
        let staged = staging.path().join("tree");
        self.stage_tree(&staged, manifest)?;
        self.persist_manifest(root, manifest)?;
        self.finalize_site(root, &staged)?;
        if let Err(err) = staging.close() {
            warn!(root = %root, error = %err, "failed to remove staging directory");
        }
        info!(root = %root, entries = manifest.len(), "distribution published");
        Ok(())
    }

    fn get_distro(&self, root: &ContentHash) -> StoreResult<Option<Manifest>> {
        let Some(body) = read_optional(&self.distro_path(root))? else {
            return Ok(None);
        };
        let lines: Vec<String> = serde_json::from_slice(&body)?;
        let manifest = Manifest::from_lines(&lines)
            .map_err(|e| StoreError::Serialization(format!("distro {root}: {e}")))?;
        Ok(Some(manifest))
    }

    fn has_distro(&self, root: &ContentHash) -> StoreResult<bool> {
        Ok(self.distro_path(root).is_file())
    }

    fn store_label(&self, label: &str, hash: &ContentHash) -> StoreResult<()> {
        validate_label(label)?;
        {
            let _guard = self.lock(LABELS_DIR, label)?;
            write_atomic(&self.label_path(label), hash.to_hex().as_bytes())?;
        }
        let config = self.site_builder.generate(label, hash)?;
        {
            let _guard = self.lock(SITE_CONFIGS_DIR, label)?;
            write_atomic(&self.site_config_path(label), config.as_bytes())?;
        }
        info!(label, hash = %hash, "label stored");
        Ok(())
    }

    fn get_label(&self, label: &str) -> StoreResult<Option<ContentHash>> {
        validate_label(label)?;
        let Some(body) = read_optional(&self.label_path(label))? else {
            return Ok(None);
        };
        let text = String::from_utf8_lossy(&body);
        let hash = ContentHash::from_hex(text.trim())
            .map_err(|e| StoreError::Serialization(format!("label {label}: {e}")))?;
        Ok(Some(hash))
    }

    fn has_label(&self, label: &str) -> StoreResult<bool> {
        validate_label(label)?;
        Ok(self.label_path(label).is_file())
    }

    fn site_config(&self, label: &str) -> StoreResult<Option<String>> {
        validate_label(label)?;
        let Some(body) = read_optional(&self.site_config_path(label))? else {
            return Ok(None);
        };
        String::from_utf8(body)
            .map(Some)
            .map_err(|e| StoreError::Serialization(format!("site config {label}: {e}")))
    }
}

impl std::fmt::Debug for FileSystemStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSystemStore")
            .field("root", &self.root)
            .field("sites_root", &self.sites_root)
            .field("locks", &self.locks)
            .finish()
    }
}

/// Write through a temp file in the target directory, then rename into place.
fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no parent"))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn read_optional(path: &Path) -> StoreResult<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(data) => Ok(Some(data)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

#[cfg(unix)]
fn link_blob(blob: &Path, target: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(blob, target)
}

#[cfg(not(unix))]
fn link_blob(blob: &Path, target: &Path) -> io::Result<()> {
    fs::copy(blob, target).map(|_| ())
}
