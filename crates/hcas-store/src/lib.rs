//! Storage engine for hcas.
//!
//! Blobs, distribution manifests and labels live behind the [`ContentStore`]
//! capability trait, with two backends:
//!
//! - [`InMemoryStore`] -- single `RwLock`, for tests and embedding
//! - [`FileSystemStore`] -- sharded blob files, symlink-farm distributions
//!   published by atomic rename, `flock` advisory locks with bounded wait
//!
//! [`CasService`] computes content hashes and Merkle roots in front of a
//! store. Moving a label renders a serving configuration through a
//! [`SiteBuilder`].
//!
//! # Design Rules
//!
//! 1. Objects are immutable once written; every key is a content hash.
//! 2. A distribution is staged privately and made visible by one rename.
//! 3. A rename onto an existing distribution is a successful publish.
//! 4. Lock timeouts are reported, never retried here.
//! 5. All I/O errors are propagated, never silently ignored.

pub mod config;
pub mod error;
pub mod fs;
pub mod lock;
pub mod memory;
pub mod service;
pub mod site;
pub mod traits;

pub use config::{LockConfig, StorageConfig};
pub use error::{StoreError, StoreResult};
pub use fs::FileSystemStore;
pub use lock::PathLock;
pub use memory::InMemoryStore;
pub use service::CasService;
pub use site::{SiteBuilder, SiteConfig, TemplateSiteBuilder, DEFAULT_TEMPLATE};
pub use traits::{ContentStore, Stored};
