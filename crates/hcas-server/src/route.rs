//! Serving distribution files straight from the store.
//!
//! A request names a distribution (a root hash or a label) and a path inside
//! it. [`DistroExtractor`]s pull the pair out of the request; the handler
//! resolves the distribution, looks the path up in its manifest and answers
//! with the blob.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use hcas_types::{ContentHash, Manifest};
use percent_encoding::percent_decode_str;
use tracing::debug;

use crate::config::{ExtractorKind, RouteConfig};
use crate::error::{ServerError, ServerResult};
use crate::handler::{blocking, load_distro, load_file, AppState};

/// Served for a path that names a directory.
pub const INDEX_FILE: &str = "index.html";

/// Distribution and file named by one request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DistroRequest {
    /// Root hash hex or label.
    pub distro: String,
    /// Absolute path inside the distribution, `/` at least.
    pub path: String,
}

impl DistroRequest {
    fn new(distro: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            distro: distro.into(),
            path: path.into(),
        }
    }
}

pub trait DistroExtractor: Send + Sync {
    fn extract(&self, host: &str, path: &str) -> ServerResult<DistroRequest>;
}

/// `/{distro}/{path}`
#[derive(Clone, Copy, Debug, Default)]
pub struct PathExtractor;

impl DistroExtractor for PathExtractor {
    fn extract(&self, _host: &str, path: &str) -> ServerResult<DistroRequest> {
        if path.is_empty() {
            return Err(ServerError::BadRequest(
                "invalid path: a path is required and can't be empty".into(),
            ));
        }
        let rest = path.strip_prefix('/').unwrap_or(path);
        let (distro, file) = match rest.split_once('/') {
            Some((distro, file)) => (distro, format!("/{file}")),
            None => (rest, "/".to_string()),
        };
        if distro.is_empty() {
            return Err(ServerError::BadRequest(format!(
                "invalid path: must contain at least a distribution ({path})"
            )));
        }
        Ok(DistroRequest::new(distro, file))
    }
}

/// `{distro}.{domain}/{path}`
///
/// Without a configured domain the last two host labels are treated as the
/// registrable domain, so `a.b.example.com` names distribution `a.b`.
#[derive(Clone, Debug, Default)]
pub struct SubdomainExtractor {
    domain: Option<String>,
}

impl SubdomainExtractor {
    pub fn new(domain: Option<String>) -> Self {
        Self {
            domain: domain.map(|d| d.trim_matches('.').to_ascii_lowercase()),
        }
    }

    fn subdomain<'a>(&self, host: &'a str) -> Option<&'a str> {
        match &self.domain {
            Some(domain) => {
                let cut = host.len().checked_sub(domain.len() + 1)?;
                let parent = host.get(cut..)?.strip_prefix('.')?;
                parent.eq_ignore_ascii_case(domain).then(|| &host[..cut])
            }
            None => {
                let mut dots = host.rmatch_indices('.').map(|(at, _)| at);
                dots.next()?;
                dots.next().map(|at| &host[..at])
            }
        }
    }
}

impl DistroExtractor for SubdomainExtractor {
    fn extract(&self, host: &str, path: &str) -> ServerResult<DistroRequest> {
        let name = host.rsplit_once(':').map_or(host, |(name, _)| name).trim_end_matches('.');
        let distro = self.subdomain(name).filter(|sub| !sub.is_empty()).ok_or_else(|| {
            ServerError::BadRequest(format!(
                "could not extract a distribution from subdomain (host: {host})"
            ))
        })?;
        let path = if path.is_empty() { "/" } else { path };
        Ok(DistroRequest::new(distro, path))
    }
}

/// Build the extractors listed in `config`, in order.
pub fn extractors_from_config(config: &RouteConfig) -> Vec<Box<dyn DistroExtractor>> {
    config
        .extractors
        .iter()
        .map(|kind| -> Box<dyn DistroExtractor> {
            match kind {
                ExtractorKind::Path => Box::new(PathExtractor),
                ExtractorKind::Subdomain => Box::new(SubdomainExtractor::new(config.domain.clone())),
            }
        })
        .collect()
}

/// State of the route server.
#[derive(Clone)]
pub struct RouteState {
    pub app: AppState,
    pub extractors: Arc<Vec<Box<dyn DistroExtractor>>>,
}

impl RouteState {
    pub fn new(app: AppState, extractors: Vec<Box<dyn DistroExtractor>>) -> Self {
        Self {
            app,
            extractors: Arc::new(extractors),
        }
    }

    /// First successful extraction, or the last failure.
    pub fn extract(&self, host: &str, path: &str) -> ServerResult<DistroRequest> {
        let mut failure = None;
        for extractor in self.extractors.iter() {
            match extractor.extract(host, path) {
                Ok(request) => return Ok(request),
                Err(err) => failure = Some(err),
            }
        }
        Err(failure.unwrap_or_else(|| ServerError::Config("no distribution extractors configured".into())))
    }
}

/// Answer any GET or HEAD with the named distribution file.
pub async fn serve_file(State(state): State<RouteState>, method: Method, headers: HeaderMap, uri: Uri) -> ServerResult<Response> {
    if method != Method::GET && method != Method::HEAD {
        return Ok(StatusCode::METHOD_NOT_ALLOWED.into_response());
    }
    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .or_else(|| uri.host())
        .unwrap_or_default();
    let path = percent_decode_str(uri.path())
        .decode_utf8()
        .map_err(|e| ServerError::BadRequest(format!("path is not UTF-8: {e}")))?;
    let request = state.extract(host, &path)?;

    let root = resolve(&state.app, request.distro).await?;
    let lines: Vec<String> = serde_json::from_slice(&load_distro(&state.app, root).await?)
        .map_err(|e| ServerError::Internal(e.to_string()))?;
    let manifest = Manifest::from_lines(&lines).map_err(|e| ServerError::Internal(e.to_string()))?;

    let file = file_path(&request.path);
    let hash = *manifest
        .get(&file)
        .ok_or_else(|| ServerError::NotFound(format!("{file} in distro {root}")))?;
    debug!(distro = %root, path = %file, blob = %hash, "serving file");
    let body = load_file(&state.app, hash).await?;
    let mime = mime_guess::from_path(&file).first_or_octet_stream();
    Ok(([(header::CONTENT_TYPE, mime.to_string())], body).into_response())
}

/// A root hash as given, otherwise the label's current target.
async fn resolve(state: &AppState, distro: String) -> ServerResult<ContentHash> {
    if let Ok(hash) = ContentHash::from_hex(&distro) {
        return Ok(hash);
    }
    blocking(&state.service, move |cas| cas.resolve_label(&distro)).await
}

/// Manifest path for a request path; directories map to their index file.
fn file_path(path: &str) -> String {
    let trimmed = path.trim_start_matches('/');
    if trimmed.is_empty() || trimmed.ends_with('/') {
        format!("{trimmed}{INDEX_FILE}")
    } else {
        trimmed.to_string()
    }
}
