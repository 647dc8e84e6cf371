//! Metrics server initialization

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use super::routes::{health, metrics};
use crate::core::config::MetricsConfig;
use crate::core::shutdown::ShutdownService;
use crate::core::telemetry::Telemetry;

pub struct MetricsServer {
    addr: SocketAddr,
    telemetry: Arc<Telemetry>,
}

impl MetricsServer {
    pub fn new(config: &MetricsConfig, telemetry: Arc<Telemetry>) -> Result<Self> {
        let addr = SocketAddr::new(
            config
                .host
                .parse()
                .with_context(|| format!("Invalid metrics host: {}", config.host))?,
            config.port,
        );
        Ok(Self { addr, telemetry })
    }

    pub fn router(telemetry: Arc<Telemetry>) -> Router {
        Router::new()
            .route("/metrics", get(metrics::metrics))
            .route("/health", get(health::health))
            .with_state(telemetry)
    }

    /// Bind and serve until shutdown. Binding happens before returning so a
    /// port conflict fails the command instead of a background task.
    pub async fn start(self, shutdown: &ShutdownService) -> Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind(self.addr)
            .await
            .with_context(|| format!("Failed to bind metrics endpoint on {}", self.addr))?;
        let local = listener.local_addr()?;
        let router = Self::router(self.telemetry);
        let wait = shutdown.wait();

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(wait)
                .await
            {
                tracing::error!(error = %e, "Metrics server error");
            }
        });
        tracing::info!(addr = %local, "Metrics endpoint listening");
        Ok((local, handle))
    }
}
