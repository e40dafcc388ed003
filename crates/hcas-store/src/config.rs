use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Advisory lock settings for the filesystem backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// When false every lock acquisition is a no-op.
    pub enabled: bool,
    /// Bounded wait before a `LockTimeout` is reported.
    pub timeout_ms: u64,
}

impl LockConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_ms: 100,
        }
    }
}

/// Where and how the filesystem backend persists objects.
///
/// ```toml
/// root = "/var/lib/hcas"
/// sites_root = "/var/lib/hcas/sites"
///
/// [locks]
/// timeout_ms = 250
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Holds `files/`, `distros/`, `labels/`, `site-configs/` and `locks/`.
    pub root: PathBuf,
    /// Published distribution trees, one directory per root hash.
    pub sites_root: PathBuf,
    pub locks: LockConfig,
}

impl StorageConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let sites_root = root.join("sites");
        Self {
            root,
            sites_root,
            locks: LockConfig::default(),
        }
    }

    /// Create both roots and return a copy with their canonical paths.
    ///
    /// Symlinks in published trees and generated site configs must point
    /// at absolute locations, so anything derived from these paths should
    /// be built from the prepared copy.
    pub fn prepare(&self) -> io::Result<Self> {
        fs::create_dir_all(&self.root)?;
        fs::create_dir_all(&self.sites_root)?;
        Ok(Self {
            root: fs::canonicalize(&self.root)?,
            sites_root: fs::canonicalize(&self.sites_root)?,
            locks: self.locks.clone(),
        })
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::new("data")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = StorageConfig::default();
        assert_eq!(config.root, PathBuf::from("data"));
        assert_eq!(config.sites_root, PathBuf::from("data/sites"));
        assert!(config.locks.enabled);
        assert_eq!(config.locks.timeout(), Duration::from_millis(100));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: StorageConfig = toml::from_str(
            r#"
            root = "/srv/cas"
            [locks]
            timeout_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(config.root, PathBuf::from("/srv/cas"));
        assert_eq!(config.sites_root, PathBuf::from("data/sites"));
        assert!(config.locks.enabled);
        assert_eq!(config.locks.timeout_ms, 250);
    }

    #[test]
    fn prepare_canonicalizes_relative_segments() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = StorageConfig::new(dir.path().join("store").join("..").join("store"));
        config.sites_root = dir.path().join("sites").join(".");
        let prepared = config.prepare().unwrap();
        let base = std::fs::canonicalize(dir.path()).unwrap();
        assert_eq!(prepared.root, base.join("store"));
        assert_eq!(prepared.sites_root, base.join("sites"));
        assert_eq!(prepared.locks, config.locks);
    }
}
