//! HTTP server for hcas.
//!
//! Exposes the storage engine over the CAS wire protocol:
//!
//! | Route | Purpose |
//! |---|---|
//! | `PUT /file`, `HEAD`/`GET /file/:hash` | blobs |
//! | `PUT /distro`, `HEAD`/`GET /distro/:hash` | distributions |
//! | `PUT /label`, `HEAD`/`GET /label/:label` | labels |
//! | `GET /healthcheck` | liveness |
//!
//! The route server ([`CasServer::serve_route`]) answers `GET` requests with
//! distribution files, naming the distribution by path or subdomain.

pub mod cache;
pub mod config;
pub mod error;
pub mod handler;
pub mod route;
pub mod router;
pub mod server;

pub use cache::{Cache, LruCache, NoCache};
pub use config::{
    Backend, CacheConfig, ExtractorKind, RouteConfig, ServerConfig, DEFAULT_PORT, DEFAULT_ROUTE_PORT,
};
pub use error::{ServerError, ServerResult};
pub use handler::AppState;
pub use route::{DistroExtractor, DistroRequest, PathExtractor, SubdomainExtractor};
pub use server::CasServer;
