use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use hcas_crypto::ContentHasher;
use hcas_store::{
    CasService, ContentStore, FileSystemStore, InMemoryStore, SiteBuilder, StoreError,
    TemplateSiteBuilder,
};
use tokio::net::TcpListener;
use tracing::info;

use crate::cache;
use crate::config::{Backend, ServerConfig};
use crate::error::{ServerError, ServerResult};
use crate::handler::AppState;
use crate::route::extractors_from_config;
use crate::router::{build_route_router, build_router};

fn site_builder(config: &ServerConfig, sites_root: &Path) -> ServerResult<Arc<dyn SiteBuilder>> {
    Ok(Arc::new(TemplateSiteBuilder::from_config(&config.site, sites_root)?))
}

/// CAS HTTP server.
pub struct CasServer {
    config: ServerConfig,
    state: AppState,
}

impl CasServer {
    /// Open the configured backend and assemble the server.
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        let store: Arc<dyn ContentStore> = match config.backend {
            Backend::Fs => {
                // Site configs must name the same absolute tree the store publishes.
                let storage = config.storage.prepare().map_err(StoreError::from)?;
                let site_builder = site_builder(&config, &storage.sites_root)?;
                Arc::new(FileSystemStore::open(&storage, site_builder)?)
            }
            Backend::Memory => Arc::new(InMemoryStore::new(site_builder(
                &config,
                &config.storage.sites_root,
            )?)),
        };
        let service = CasService::new(store, ContentHasher::new(config.hash_algorithm));
        Ok(Self::with_service(config, service))
    }

    /// Serve an existing service, e.g. one shared with in-process clients.
    pub fn with_service(config: ServerConfig, service: CasService) -> Self {
        let cache: Arc<dyn cache::Cache> = Arc::from(cache::from_config(&config.cache));
        Self {
            state: AppState::new(service, cache),
            config,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn service(&self) -> &CasService {
        &self.state.service
    }

    /// The CAS API.
    pub fn router(&self) -> axum::Router {
        build_router(self.state.clone(), self.config.max_body_bytes)
    }

    /// Read-only file serving over the same store and cache.
    pub fn route_router(&self) -> axum::Router {
        build_route_router(self.state.clone(), extractors_from_config(&self.config.route))
    }

    /// Bind the configured address and serve until Ctrl-C.
    pub async fn serve(self) -> ServerResult<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve_with_shutdown(listener, ctrl_c()).await
    }

    /// Serve on an already bound listener until `shutdown` resolves.
    pub async fn serve_with_shutdown<F>(self, listener: TcpListener, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let router = self.router();
        run(listener, router, shutdown, "hcas server", &self.config).await
    }

    /// Bind the route address and serve files until Ctrl-C.
    pub async fn serve_route(self) -> ServerResult<()> {
        let listener = TcpListener::bind(self.config.route.bind_addr).await?;
        self.serve_route_with_shutdown(listener, ctrl_c()).await
    }

    /// Serve files on an already bound listener until `shutdown` resolves.
    pub async fn serve_route_with_shutdown<F>(self, listener: TcpListener, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let router = self.route_router();
        run(listener, router, shutdown, "hcas router", &self.config).await
    }
}

async fn ctrl_c() {
    let _ = tokio::signal::ctrl_c().await;
}

async fn run<F>(listener: TcpListener, router: axum::Router, shutdown: F, name: &str, config: &ServerConfig) -> ServerResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!(%addr, backend = ?config.backend, algorithm = %config.hash_algorithm, "{name} listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))?;
    info!("{name} stopped");
    Ok(())
}
