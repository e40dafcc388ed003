use std::time::Duration;

use hcas_store::CasService;
use hcas_types::{ContentHash, Manifest};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::{StatusCode, Url};
use tracing::trace;

use crate::error::{SyncError, SyncResult};
use crate::retry::RetryPolicy;

/// Client side of the CAS wire protocol.
///
/// Calls block; the synchronizer drives them from worker threads.
pub trait CasTransport: Send + Sync {
    /// Dedup check for a blob.
    fn has_file(&self, hash: &ContentHash) -> SyncResult<bool>;

    /// Upload a blob, returning the hash the remote stored it under.
    fn put_file(&self, data: &[u8]) -> SyncResult<ContentHash>;

    /// Publish a manifest, returning the distribution hash.
    fn put_distro(&self, manifest: &Manifest) -> SyncResult<ContentHash>;

    fn has_distro(&self, hash: &ContentHash) -> SyncResult<bool>;

    fn set_label(&self, label: &str, hash: &ContentHash) -> SyncResult<()>;
}

pub const DEFAULT_URL: &str = "http://localhost:2485/";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpConfig {
    pub base_url: String,
    /// Per-request timeout for file existence checks and uploads.
    pub upload_timeout: Duration,
    /// Per-request timeout for manifest publish and label calls, which can
    /// be much slower on the server.
    pub manifest_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_URL.to_string(),
            upload_timeout: Duration::from_secs(5),
            manifest_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

/// Blocking HTTP transport with separate upload and manifest clients.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    base: Url,
    upload: Client,
    manifest: Client,
    retry: RetryPolicy,
}

impl HttpTransport {
    pub fn new(config: &HttpConfig) -> SyncResult<Self> {
        let mut base = config.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base = Url::parse(&base)
            .map_err(|e| SyncError::Config(format!("invalid URL {}: {e}", config.base_url)))?;
        let upload = Client::builder().timeout(config.upload_timeout).build()?;
        let manifest = Client::builder().timeout(config.manifest_timeout).build()?;
        Ok(Self {
            base,
            upload,
            manifest,
            retry: config.retry,
        })
    }

    /// Server root every request path is joined onto.
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn url(&self, path: &str) -> SyncResult<Url> {
        self.base
            .join(path)
            .map_err(|e| SyncError::Config(format!("invalid path {path}: {e}")))
    }

    /// Send with retries. 5xx answers become retryable errors; any other
    /// status is returned for the caller to interpret.
    fn execute(
        &self,
        operation: &str,
        build: impl Fn() -> RequestBuilder,
    ) -> SyncResult<(StatusCode, String)> {
        self.retry.run(operation, || {
            let response = build().send()?;
            let status = response.status();
            let body = response.text()?;
            trace!(operation, status = status.as_u16(), "response");
            if status.is_server_error() {
                return Err(status_error(operation, status, body));
            }
            Ok((status, body))
        })
    }

    fn exists(&self, client: &Client, operation: &str, path: &str) -> SyncResult<bool> {
        let url = self.url(path)?;
        match self.execute(operation, || client.head(url.clone()))? {
            (StatusCode::OK, _) => Ok(true),
            (StatusCode::NOT_FOUND, _) => Ok(false),
            (status, body) => Err(status_error(operation, status, body)),
        }
    }
}

impl CasTransport for HttpTransport {
    fn has_file(&self, hash: &ContentHash) -> SyncResult<bool> {
        self.exists(&self.upload, "HEAD /file", &format!("file/{hash}"))
    }

    fn put_file(&self, data: &[u8]) -> SyncResult<ContentHash> {
        let url = self.url("file")?;
        let (status, body) =
            self.execute("PUT /file", || self.upload.put(url.clone()).body(data.to_vec()))?;
        parse_hash("PUT /file", status, body)
    }

    fn put_distro(&self, manifest: &Manifest) -> SyncResult<ContentHash> {
        let url = self.url("distro")?;
        let body = manifest.to_wire();
        let (status, response) =
            self.execute("PUT /distro", || self.manifest.put(url.clone()).body(body.clone()))?;
        parse_hash("PUT /distro", status, response)
    }

    fn has_distro(&self, hash: &ContentHash) -> SyncResult<bool> {
        self.exists(&self.manifest, "HEAD /distro", &format!("distro/{hash}"))
    }

    fn set_label(&self, label: &str, hash: &ContentHash) -> SyncResult<()> {
        let url = self.url("label")?;
        let hex = hash.to_hex();
        let (status, body) = self.execute("PUT /label", || {
            self.manifest
                .put(url.clone())
                .form(&[("label", label), ("hash", hex.as_str())])
        })?;
        if status != StatusCode::OK {
            return Err(status_error("PUT /label", status, body));
        }
        Ok(())
    }
}

fn status_error(operation: &str, status: StatusCode, body: String) -> SyncError {
    SyncError::Status {
        operation: operation.to_string(),
        status: status.as_u16(),
        body,
    }
}

fn parse_hash(operation: &str, status: StatusCode, body: String) -> SyncResult<ContentHash> {
    if status != StatusCode::OK {
        return Err(status_error(operation, status, body));
    }
    ContentHash::from_hex(body.trim())
        .map_err(|e| SyncError::InvalidResponse(format!("{operation}: {e}")))
}

/// In-process transport straight onto a [`CasService`].
#[derive(Clone, Debug)]
pub struct LocalTransport {
    service: CasService,
}

impl LocalTransport {
    pub fn new(service: CasService) -> Self {
        Self { service }
    }

    /// The in-process service calls go to.
    pub fn service(&self) -> &CasService {
        &self.service
    }
}

impl CasTransport for LocalTransport {
    fn has_file(&self, hash: &ContentHash) -> SyncResult<bool> {
        Ok(self.service.has_file(hash)?)
    }

    fn put_file(&self, data: &[u8]) -> SyncResult<ContentHash> {
        let (hash, _) = self.service.put_file(data)?;
        Ok(hash)
    }

    fn put_distro(&self, manifest: &Manifest) -> SyncResult<ContentHash> {
        Ok(self.service.publish(manifest)?)
    }

    fn has_distro(&self, hash: &ContentHash) -> SyncResult<bool> {
        Ok(self.service.has_distro(hash)?)
    }

    fn set_label(&self, label: &str, hash: &ContentHash) -> SyncResult<()> {
        Ok(self.service.set_label(label, hash)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_gains_trailing_slash() {
        let transport = HttpTransport::new(&HttpConfig {
            base_url: "http://cas.internal:2485/api".into(),
            ..HttpConfig::default()
        })
        .unwrap();
        assert_eq!(transport.base_url().as_str(), "http://cas.internal:2485/api/");
        assert_eq!(
            transport.url("file").unwrap().as_str(),
            "http://cas.internal:2485/api/file"
        );
    }

    #[test]
    fn invalid_base_url_is_a_config_error() {
        let err = HttpTransport::new(&HttpConfig {
            base_url: "not a url".into(),
            ..HttpConfig::default()
        })
        .unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }

    #[test]
    fn non_ok_hash_response_is_a_status_error() {
        let err = parse_hash("PUT /file", StatusCode::BAD_REQUEST, "nope".into()).unwrap_err();
        assert!(matches!(err, SyncError::Status { status: 400, .. }));
        assert!(!err.is_retryable());

        let err = parse_hash("PUT /file", StatusCode::OK, "zz".into()).unwrap_err();
        assert!(matches!(err, SyncError::InvalidResponse(_)));
    }
}
