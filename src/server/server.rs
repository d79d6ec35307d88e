//! Relay Server

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context};
use axum::Router;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::connection::Registry;
use crate::metrics::RelayMetrics;
use crate::relay::RelayDispatcher;
use crate::shutdown::ShutdownCoordinator;
use crate::Result;
use super::api::{create_router, AppState, DEFAULT_PAGE};

/// Serves the page and the relay endpoint on one listening socket
pub struct RelayServer {
    config: Arc<Config>,
    dispatcher: RelayDispatcher,
    shutdown: ShutdownCoordinator,
    page: Arc<str>,
    listener: Option<TcpListener>,
    local_addr: Option<SocketAddr>,
}

impl RelayServer {
    /// Create a server with a fresh registry and metrics collector
    pub fn new(config: Config, shutdown: ShutdownCoordinator) -> Result<Self> {
        let page = load_page(&config)?;
        let metrics = Arc::new(RelayMetrics::new().context("Failed to create metrics")?);
        let dispatcher = RelayDispatcher::new(Arc::new(Registry::new()), metrics);

        Ok(Self {
            config: Arc::new(config),
            dispatcher,
            shutdown,
            page,
            listener: None,
            local_addr: None,
        })
    }

    pub fn registry(&self) -> &Arc<Registry> {
        self.dispatcher.registry()
    }

    pub fn metrics(&self) -> &Arc<RelayMetrics> {
        self.dispatcher.metrics()
    }

    /// Address the listener is bound to, once bound
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Bind the listening socket
    pub async fn bind(&mut self) -> Result<SocketAddr> {
        let bind_addr = self.config.server.bind_addr;

        info!("Binding TCP listener to {}", bind_addr);
        let listener = TcpListener::bind(bind_addr)
            .await
            .with_context(|| format!("Failed to bind relay server to {}", bind_addr))?;
        let local_addr = listener.local_addr().context("Failed to get listener address")?;

        info!("Successfully bound to {}", local_addr);
        self.listener = Some(listener);
        self.local_addr = Some(local_addr);
        Ok(local_addr)
    }

    pub fn router(&self) -> Router {
        let state = AppState {
            dispatcher: self.dispatcher.clone(),
            page: Arc::clone(&self.page),
            shutdown: self.shutdown.clone(),
            outbound_capacity: self.config.server.outbound_queue_capacity,
        };
        create_router(state, self.config.monitoring.metrics_enabled)
    }

    /// Serve until the shutdown signal fires. Binds first if needed.
    pub async fn start(&mut self) -> Result<()> {
        if self.listener.is_none() {
            self.bind().await?;
        }
        let listener = self.listener.take()
            .ok_or_else(|| anyhow!("Listener not initialized"))?;

        let app = self.router().into_make_service_with_connect_info::<SocketAddr>();

        info!("Relay server accepting connections");
        axum::serve(listener, app)
            .with_graceful_shutdown(self.shutdown.signalled())
            .await
            .context("Relay server error")?;

        info!("Relay server stopped accepting connections");
        Ok(())
    }

    /// Wait for open connections to drain, up to the shutdown timeout
    pub async fn wait_for_connections_to_close(&self) {
        let shutdown_timeout = self.shutdown.timeout();
        let start_time = Instant::now();

        info!("Waiting for {} open connections to close (timeout: {:?})",
              self.registry().len(), shutdown_timeout);

        while !self.registry().is_empty() && start_time.elapsed() < shutdown_timeout {
            debug!("Waiting for {} open connections to close", self.registry().len());
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        let remaining = self.registry().len();
        let elapsed = start_time.elapsed();

        if remaining == 0 {
            info!("All connections closed gracefully in {:?}", elapsed);
        } else {
            warn!("Shutdown timeout reached after {:?} with {} connections still open",
                  elapsed, remaining);
        }
    }
}

/// Read the configured page, or fall back to the built-in one
fn load_page(config: &Config) -> Result<Arc<str>> {
    match &config.server.index_page {
        Some(path) => {
            let page = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read index page: {}", path.display()))?;
            info!("Serving index page from {}", path.display());
            Ok(page.into())
        }
        None => Ok(DEFAULT_PAGE.into()),
    }
}
