use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use hcas_types::{validate_label, ContentHash, Manifest};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::site::{SiteBuilder, TemplateSiteBuilder};
use crate::traits::{ContentStore, Stored};

#[derive(Default)]
struct Maps {
    blobs: HashMap<ContentHash, Vec<u8>>,
    distros: HashMap<ContentHash, Manifest>,
    labels: HashMap<String, ContentHash>,
    site_configs: HashMap<String, String>,
}

/// In-memory store for tests and embedding.
///
/// Everything lives behind a single `RwLock`; readers run concurrently and a
/// publish or label move is atomic with respect to them.
pub struct InMemoryStore {
    maps: RwLock<Maps>,
    site_builder: Arc<dyn SiteBuilder>,
}

impl InMemoryStore {
    pub fn new(site_builder: Arc<dyn SiteBuilder>) -> Self {
        Self {
            maps: RwLock::new(Maps::default()),
            site_builder,
        }
    }

    /// Number of stored blobs.
    pub fn blob_count(&self) -> usize {
        self.read().map(|maps| maps.blobs.len()).unwrap_or(0)
    }

    /// Number of published distributions.
    pub fn distro_count(&self) -> usize {
        self.read().map(|maps| maps.distros.len()).unwrap_or(0)
    }

    /// Total bytes across all stored blobs.
    pub fn total_bytes(&self) -> u64 {
        self.read()
            .map(|maps| maps.blobs.values().map(|b| b.len() as u64).sum())
            .unwrap_or(0)
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Maps>> {
        self.maps.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Maps>> {
        self.maps.write().map_err(|_| StoreError::Poisoned)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(Arc::new(TemplateSiteBuilder::default()))
    }
}

impl ContentStore for InMemoryStore {
    fn store(&self, hash: &ContentHash, data: &[u8]) -> StoreResult<Stored> {
        let mut maps = self.write()?;
        if maps.blobs.contains_key(hash) {
            return Ok(Stored::AlreadyExists);
        }
        maps.blobs.insert(*hash, data.to_vec());
        debug!(hash = %hash, size = data.len(), "blob stored");
        Ok(Stored::Created)
    }

    fn get(&self, hash: &ContentHash) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.read()?.blobs.get(hash).cloned())
    }

    fn has(&self, hash: &ContentHash) -> StoreResult<bool> {
        Ok(self.read()?.blobs.contains_key(hash))
    }

    fn store_distro(&self, root: &ContentHash, manifest: &Manifest) -> StoreResult<()> {
        let mut maps = self.write()?;
        if let Some(missing) = manifest
            .entries()
            .iter()
            .find(|entry| !maps.blobs.contains_key(&entry.hash))
        {
            return Err(StoreError::MissingBlob {
                path: missing.path.clone(),
                hash: missing.hash,
            });
        }
        if maps.distros.contains_key(root) {
            debug!(root = %root, "distribution already published");
            return Ok(());
        }
        maps.distros.insert(*root, manifest.clone());
        debug!(root = %root, entries = manifest.len(), "distribution published");
        Ok(())
    }

    fn get_distro(&self, root: &ContentHash) -> StoreResult<Option<Manifest>> {
        Ok(self.read()?.distros.get(root).cloned())
    }

    fn has_distro(&self, root: &ContentHash) -> StoreResult<bool> {
        Ok(self.read()?.distros.contains_key(root))
    }

    fn store_label(&self, label: &str, hash: &ContentHash) -> StoreResult<()> {
        validate_label(label)?;
        let config = self.site_builder.generate(label, hash)?;
        let mut maps = self.write()?;
        maps.labels.insert(label.to_string(), *hash);
        maps.site_configs.insert(label.to_string(), config);
        debug!(label, hash = %hash, "label stored");
        Ok(())
    }

    fn get_label(&self, label: &str) -> StoreResult<Option<ContentHash>> {
        validate_label(label)?;
        Ok(self.read()?.labels.get(label).copied())
    }

    fn has_label(&self, label: &str) -> StoreResult<bool> {
        validate_label(label)?;
        Ok(self.read()?.labels.contains_key(label))
    }

    fn site_config(&self, label: &str) -> StoreResult<Option<String>> {
        validate_label(label)?;
        Ok(self.read()?.site_configs.get(label).cloned())
    }
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("blob_count", &self.blob_count())
            .field("distro_count", &self.distro_count())
            .finish()
    }
}
