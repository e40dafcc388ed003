use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;

use hcas_crypto::HashAlgorithm;
use hcas_store::{SiteConfig, StorageConfig};
use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

pub const DEFAULT_PORT: u16 = 2485;
pub const DEFAULT_ROUTE_PORT: u16 = 2486;

/// Storage backend selection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Fs,
    Memory,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Maximum number of cached bodies.
    pub capacity: usize,
    /// Bodies larger than this are never cached.
    pub max_item_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 1024,
            max_item_bytes: 1024 * 1024,
        }
    }
}

/// How the route server finds the distribution in a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractorKind {
    /// `/{distro}/{path}`
    Path,
    /// `{distro}.example.com/{path}`
    Subdomain,
}

impl FromStr for ExtractorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "path" => Ok(Self::Path),
            "subdomain" => Ok(Self::Subdomain),
            other => Err(format!("unknown distribution extractor {other:?}")),
        }
    }
}

/// Settings for serving distribution files directly.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteConfig {
    pub bind_addr: SocketAddr,
    /// Tried in order; the first that matches wins.
    pub extractors: Vec<ExtractorKind>,
    /// Parent domain for subdomain extraction. When unset the last two host
    /// labels are taken as the registrable domain.
    pub domain: Option<String>,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_ROUTE_PORT)),
            extractors: vec![ExtractorKind::Path],
            domain: None,
        }
    }
}

/// Server configuration, loadable from TOML.
///
/// ```toml
/// bind_addr = "0.0.0.0:2485"
/// hash_algorithm = "sha256"
/// backend = "fs"
///
/// [storage]
/// root = "/var/lib/hcas"
/// sites_root = "/var/lib/hcas/sites"
///
/// [site]
/// server_name = "cdn.example.com"
///
/// [route]
/// extractors = ["subdomain", "path"]
/// domain = "cdn.example.com"
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub hash_algorithm: HashAlgorithm,
    pub backend: Backend,
    /// Upper bound on request bodies (`PUT /file`, `PUT /distro`).
    pub max_body_bytes: usize,
    pub storage: StorageConfig,
    pub cache: CacheConfig,
    pub site: SiteConfig,
    pub route: RouteConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            hash_algorithm: HashAlgorithm::default(),
            backend: Backend::default(),
            max_body_bytes: 64 * 1024 * 1024,
            storage: StorageConfig::default(),
            cache: CacheConfig::default(),
            site: SiteConfig::default(),
            route: RouteConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(text: &str) -> ServerResult<Self> {
        toml::from_str(text).map_err(|e| ServerError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> ServerResult<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| ServerError::Config(format!("reading {}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn default_config() {
        let c = ServerConfig::default();
        assert_eq!(c.bind_addr.port(), DEFAULT_PORT);
        assert_eq!(c.hash_algorithm, HashAlgorithm::Sha256);
        assert_eq!(c.backend, Backend::Fs);
        assert_eq!(c.max_body_bytes, 64 * 1024 * 1024);
        assert!(c.cache.enabled);
        assert!(c.storage.locks.enabled);
        assert_eq!(c.route.bind_addr.port(), DEFAULT_ROUTE_PORT);
        assert_eq!(c.route.extractors, vec![ExtractorKind::Path]);
    }

    #[test]
    fn toml_overrides_nested_sections() {
        let c = ServerConfig::from_toml_str(
            r#"
            bind_addr = "127.0.0.1:9000"
            hash_algorithm = "blake3"
            backend = "memory"

            [storage]
            root = "/srv/cas"

            [storage.locks]
            timeout_ms = 500

            [cache]
            enabled = false

            [site]
            server_name = "cdn.test"

            [route]
            extractors = ["subdomain", "path"]
            domain = "cdn.test"
            "#,
        )
        .unwrap();
        assert_eq!(c.bind_addr, SocketAddr::from(([127, 0, 0, 1], 9000)));
        assert_eq!(c.hash_algorithm, HashAlgorithm::Blake3);
        assert_eq!(c.backend, Backend::Memory);
        assert_eq!(c.storage.root, PathBuf::from("/srv/cas"));
        assert_eq!(c.storage.locks.timeout_ms, 500);
        assert!(!c.cache.enabled);
        assert_eq!(c.cache.capacity, 1024);
        assert_eq!(c.site.server_name, "cdn.test");
        assert_eq!(c.route.extractors, vec![ExtractorKind::Subdomain, ExtractorKind::Path]);
        assert_eq!(c.route.domain.as_deref(), Some("cdn.test"));
        assert_eq!(c.route.bind_addr.port(), DEFAULT_ROUTE_PORT);
    }

    #[test]
    fn extractor_names_parse() {
        assert_eq!("path".parse::<ExtractorKind>(), Ok(ExtractorKind::Path));
        assert_eq!("Subdomain".parse::<ExtractorKind>(), Ok(ExtractorKind::Subdomain));
        assert!("header".parse::<ExtractorKind>().is_err());
    }

    #[test]
    fn unknown_values_are_config_errors() {
        assert!(matches!(
            ServerConfig::from_toml_str("backend = \"s3\""),
            Err(ServerError::Config(_))
        ));
        assert!(ServerConfig::load(Path::new("/definitely/not/here.toml")).is_err());
    }
}
