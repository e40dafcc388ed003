use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Form;
use bytes::Bytes;
use hcas_store::{CasService, StoreResult};
use hcas_types::ContentHash;
use serde::Deserialize;
use tracing::debug;

use crate::cache::{distro_key, file_key, Cache};
use crate::error::{ServerError, ServerResult};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub service: CasService,
    pub cache: Arc<dyn Cache>,
}

impl AppState {
    pub fn new(service: CasService, cache: Arc<dyn Cache>) -> Self {
        Self { service, cache }
    }
}

/// Run a blocking store call off the async executor.
pub(crate) async fn blocking<T, F>(service: &CasService, call: F) -> ServerResult<T>
where
    T: Send + 'static,
    F: FnOnce(CasService) -> StoreResult<T> + Send + 'static,
{
    let service = service.clone();
    tokio::task::spawn_blocking(move || call(service))
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))?
        .map_err(ServerError::from)
}

fn parse_hash(text: &str) -> ServerResult<ContentHash> {
    ContentHash::from_hex(text).map_err(|e| ServerError::BadRequest(e.to_string()))
}

fn presence(found: bool) -> StatusCode {
    if found {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}

pub async fn healthcheck() -> &'static str {
    "OK"
}

pub async fn put_file(State(state): State<AppState>, body: Bytes) -> ServerResult<String> {
    let data = body.clone();
    let (hash, stored) = blocking(&state.service, move |cas| cas.put_file(&data)).await?;
    let hex = hash.to_hex();
    state.cache.set(&file_key(&hex), body);
    debug!(hash = %hex, %stored, "file stored");
    Ok(hex)
}

pub async fn head_file(State(state): State<AppState>, Path(hash): Path<String>) -> ServerResult<StatusCode> {
    let hash = parse_hash(&hash)?;
    let found = blocking(&state.service, move |cas| cas.has_file(&hash)).await?;
    Ok(presence(found))
}

pub async fn get_file(State(state): State<AppState>, Path(hash): Path<String>) -> ServerResult<Response> {
    let hash = parse_hash(&hash)?;
    Ok(load_file(&state, hash).await?.into_response())
}

/// Blob bytes, through the response cache.
pub(crate) async fn load_file(state: &AppState, hash: ContentHash) -> ServerResult<Bytes> {
    let key = file_key(&hash.to_hex());
    if let Some(cached) = state.cache.get(&key) {
        return Ok(cached);
    }
    let data = blocking(&state.service, move |cas| cas.get_file(&hash))
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("file {hash}")))?;
    let data = Bytes::from(data);
    state.cache.set(&key, data.clone());
    Ok(data)
}

pub async fn put_distro(State(state): State<AppState>, body: String) -> ServerResult<String> {
    let root = blocking(&state.service, move |cas| cas.put_distro(&body)).await?;
    debug!(root = %root, "distro stored");
    Ok(root.to_hex())
}

pub async fn head_distro(State(state): State<AppState>, Path(hash): Path<String>) -> ServerResult<StatusCode> {
    let hash = parse_hash(&hash)?;
    let found = blocking(&state.service, move |cas| cas.has_distro(&hash)).await?;
    Ok(presence(found))
}

/// JSON array of `path:hash` lines.
pub async fn get_distro(State(state): State<AppState>, Path(hash): Path<String>) -> ServerResult<Response> {
    let hash = parse_hash(&hash)?;
    let body = load_distro(&state, hash).await?;
    Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
}

/// The JSON line list of a distribution, through the response cache.
pub(crate) async fn load_distro(state: &AppState, hash: ContentHash) -> ServerResult<Bytes> {
    let key = distro_key(&hash.to_hex());
    if let Some(cached) = state.cache.get(&key) {
        return Ok(cached);
    }
    let manifest = blocking(&state.service, move |cas| cas.get_distro(&hash))
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("distro {hash}")))?;
    let body = serde_json::to_vec(&manifest.to_lines()).map_err(|e| ServerError::Internal(e.to_string()))?;
    let body = Bytes::from(body);
    state.cache.set(&key, body.clone());
    Ok(body)
}

#[derive(Debug, Deserialize)]
pub struct LabelForm {
    label: Option<String>,
    hash: Option<String>,
}

pub async fn put_label(State(state): State<AppState>, Form(form): Form<LabelForm>) -> ServerResult<StatusCode> {
    let (label, hash) = match (form.label, form.hash) {
        (Some(label), Some(hash)) if !label.is_empty() && !hash.is_empty() => (label, hash),
        (label, hash) => {
            return Err(ServerError::BadRequest(format!(
                "both label and hash must be set (label: {:?}, hash: {:?})",
                label.unwrap_or_default(),
                hash.unwrap_or_default()
            )))
        }
    };
    let hash = parse_hash(&hash)?;
    blocking(&state.service, move |cas| cas.set_label(&label, &hash)).await?;
    Ok(StatusCode::OK)
}

pub async fn get_label(State(state): State<AppState>, Path(label): Path<String>) -> ServerResult<String> {
    let hash = blocking(&state.service, move |cas| cas.resolve_label(&label)).await?;
    Ok(hash.to_hex())
}

pub async fn head_label(State(state): State<AppState>, Path(label): Path<String>) -> ServerResult<StatusCode> {
    let found = blocking(&state.service, move |cas| cas.has_label(&label)).await?;
    Ok(presence(found))
}
