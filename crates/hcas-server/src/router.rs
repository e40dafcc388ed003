use axum::extract::DefaultBodyLimit;
use axum::routing::{get, put};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::handler::{self, AppState};
use crate::route::{self, DistroExtractor, RouteState};

/// Build the axum router with every CAS endpoint.
pub fn build_router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/healthcheck", get(handler::healthcheck))
        .route("/file", put(handler::put_file))
        .route("/file/:hash", get(handler::get_file).head(handler::head_file))
        .route("/distro", put(handler::put_distro))
        .route("/distro/:hash", get(handler::get_distro).head(handler::head_distro))
        .route("/label", put(handler::put_label))
        .route("/label/:label", get(handler::get_label).head(handler::head_label))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Build the router that serves distribution files by path or host.
pub fn build_route_router(state: AppState, extractors: Vec<Box<dyn DistroExtractor>>) -> Router {
    Router::new()
        .route("/healthcheck", get(handler::healthcheck))
        .fallback(route::serve_file)
        .layer(TraceLayer::new_for_http())
        .with_state(RouteState::new(state, extractors))
}
