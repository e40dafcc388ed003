use std::sync::Arc;

use hcas_crypto::{ContentHasher, MerkleTree};
use hcas_types::{ContentHash, Manifest};
use tracing::{debug, instrument};

use crate::error::{StoreError, StoreResult};
use crate::traits::{ContentStore, Stored};

/// Hash-computing front of a [`ContentStore`].
///
/// The store itself trusts the hashes it is handed; this facade derives them
/// from content (blobs) and from the Merkle tree (distributions), which is
/// what the HTTP server and in-process clients call.
#[derive(Clone)]
pub struct CasService {
    store: Arc<dyn ContentStore>,
    hasher: ContentHasher,
}

impl CasService {
    pub fn new(store: Arc<dyn ContentStore>, hasher: ContentHasher) -> Self {
        Self { store, hasher }
    }

    pub fn hasher(&self) -> ContentHasher {
        self.hasher
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    /// Hash and store a blob.
    pub fn put_file(&self, data: &[u8]) -> StoreResult<(ContentHash, Stored)> {
        let hash = self.hasher.hash(data);
        let stored = self.store.store(&hash, data)?;
        debug!(hash = %hash, size = data.len(), %stored, "file put");
        Ok((hash, stored))
    }

    /// Blob bytes by content hash.
    pub fn get_file(&self, hash: &ContentHash) -> StoreResult<Option<Vec<u8>>> {
        self.store.get(hash)
    }

    pub fn has_file(&self, hash: &ContentHash) -> StoreResult<bool> {
        self.store.has(hash)
    }

    /// Parse a `path:hash` line body and publish it.
    ///
    /// A malformed body is rejected as a whole before anything is written.
    #[instrument(skip_all, fields(bytes = body.len()))]
    pub fn put_distro(&self, body: &str) -> StoreResult<ContentHash> {
        let manifest = Manifest::parse(body)?;
        self.publish(&manifest)
    }

    /// Publish a manifest under its Merkle root, preserving entry order.
    pub fn publish(&self, manifest: &Manifest) -> StoreResult<ContentHash> {
        let tree = MerkleTree::from_manifest(&self.hasher, manifest)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let root = tree.root();
        self.store.store_distro(&root, manifest)?;
        debug!(root = %root, entries = manifest.len(), depth = tree.depth(), "distro put");
        Ok(root)
    }

    /// The manifest of a published distribution.
    pub fn get_distro(&self, root: &ContentHash) -> StoreResult<Option<Manifest>> {
        self.store.get_distro(root)
    }

    pub fn has_distro(&self, root: &ContentHash) -> StoreResult<bool> {
        self.store.has_distro(root)
    }

    /// Move `label` to `hash` and regenerate its site config.
    pub fn set_label(&self, label: &str, hash: &ContentHash) -> StoreResult<()> {
        self.store.store_label(label, hash)
    }

    pub fn get_label(&self, label: &str) -> StoreResult<Option<ContentHash>> {
        self.store.get_label(label)
    }

    pub fn has_label(&self, label: &str) -> StoreResult<bool> {
        self.store.has_label(label)
    }

    /// Distribution a label points at, or `NotFound`.
    pub fn resolve_label(&self, label: &str) -> StoreResult<ContentHash> {
        self.store
            .get_label(label)?
            .ok_or_else(|| StoreError::not_found("label", label))
    }
}

impl std::fmt::Debug for CasService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CasService")
            .field("algorithm", &self.hasher.algorithm())
            .finish()
    }
}
