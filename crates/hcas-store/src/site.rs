//! Serving configuration generated whenever a label moves.

use std::fs;
use std::path::{Path, PathBuf};

use hcas_types::ContentHash;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Renders the serving artifact for a label pointing at a distribution.
pub trait SiteBuilder: Send + Sync {
    fn generate(&self, label: &str, hash: &ContentHash) -> StoreResult<String>;
}

/// Built-in nginx server block.
pub const DEFAULT_TEMPLATE: &str = "\
server {
    listen 80;
    server_name {{server_name}};
    root {{root_path}};

    # label {{label}} -> {{hash}}
    location / {
        try_files $uri $uri/index.html =404;
    }
}
";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Domain appended to the label: label `prod` serves `prod.{server_name}`.
    pub server_name: String,
    /// Template file; the built-in nginx block when unset.
    pub template: Option<PathBuf>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            server_name: "localhost".to_string(),
            template: None,
        }
    }
}

/// Substitutes `{{label}}`, `{{hash}}`, `{{root_path}}` and `{{server_name}}`.
#[derive(Clone, Debug)]
pub struct TemplateSiteBuilder {
    template: String,
    server_name: String,
    sites_root: PathBuf,
}

impl TemplateSiteBuilder {
    pub fn new(
        template: impl Into<String>,
        server_name: impl Into<String>,
        sites_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            template: template.into(),
            server_name: server_name.into(),
            sites_root: sites_root.into(),
        }
    }

    /// Build from configuration, reading the template file if one is set.
    pub fn from_config(config: &SiteConfig, sites_root: &Path) -> StoreResult<Self> {
        let template = match &config.template {
            Some(path) => fs::read_to_string(path).map_err(|e| {
                StoreError::SiteBuilder(format!("reading template {}: {e}", path.display()))
            })?,
            None => DEFAULT_TEMPLATE.to_string(),
        };
        Ok(Self::new(template, config.server_name.clone(), sites_root))
    }

    fn lookup(&self, key: &str, label: &str, hash: &ContentHash) -> Option<String> {
        match key {
            "label" => Some(label.to_string()),
            "hash" => Some(hash.to_hex()),
            "root_path" => Some(self.sites_root.join(hash.to_hex()).display().to_string()),
            "server_name" => Some(format!("{label}.{}", self.server_name)),
            _ => None,
        }
    }
}

impl Default for TemplateSiteBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPLATE, "localhost", "sites")
    }
}

impl SiteBuilder for TemplateSiteBuilder {
    fn generate(&self, label: &str, hash: &ContentHash) -> StoreResult<String> {
        let mut out = String::with_capacity(self.template.len());
        let mut rest = self.template.as_str();
        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after
                .find("}}")
                .ok_or_else(|| StoreError::SiteBuilder("unterminated placeholder".into()))?;
            let key = after[..end].trim();
            let value = self
                .lookup(key, label, hash)
                .ok_or_else(|| StoreError::SiteBuilder(format!("unknown placeholder {key:?}")))?;
            out.push_str(&value);
            rest = &after[end + 2..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash() -> ContentHash {
        ContentHash::from_digest([0xab; 32])
    }

    #[test]
    fn substitutes_every_placeholder() {
        let builder = TemplateSiteBuilder::new(
            "{{label}} {{ hash }} {{root_path}} {{server_name}}",
            "example.com",
            "/srv/sites",
        );
        let hex = hash().to_hex();
        assert_eq!(
            builder.generate("prod", &hash()).unwrap(),
            format!("prod {hex} /srv/sites/{hex} prod.example.com")
        );
    }

    #[test]
    fn default_template_renders_server_block() {
        let text = TemplateSiteBuilder::default()
            .generate("prod", &hash())
            .unwrap();
        assert!(text.contains("server_name prod.localhost;"));
        assert!(text.contains(&format!("root sites/{};", hash().to_hex())));
        assert!(!text.contains("{{"));
    }

    #[test]
    fn unknown_or_unterminated_placeholders_fail() {
        let unknown = TemplateSiteBuilder::new("{{nope}}", "x", "/s");
        assert!(matches!(
            unknown.generate("l", &hash()),
            Err(StoreError::SiteBuilder(_))
        ));
        let open = TemplateSiteBuilder::new("root {{hash", "x", "/s");
        assert!(open.generate("l", &hash()).is_err());
    }

    #[test]
    fn template_is_read_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("site.tmpl");
        fs::write(&path, "host {{server_name}}").unwrap();
        let config = SiteConfig {
            server_name: "cdn.test".into(),
            template: Some(path),
        };
        let builder = TemplateSiteBuilder::from_config(&config, Path::new("/s")).unwrap();
        assert_eq!(builder.generate("qa", &hash()).unwrap(), "host qa.cdn.test");

        let missing = SiteConfig {
            template: Some(dir.path().join("absent")),
            ..SiteConfig::default()
        };
        assert!(TemplateSiteBuilder::from_config(&missing, Path::new("/s")).is_err());
    }
}
