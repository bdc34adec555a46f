//! Studio gateway service: owns the HTTP server and its background tasks.

use crate::domain::config::GatewayConfig;
use crate::domain::error::GatewayError;
use crate::middleware::{cleanup_task, GatewayMetrics, MiddlewareStack};
use crate::ports::StudioPorts;
use crate::router::build_router;
use crate::studio::StudioService;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// How often idle rate-limit buckets are pruned.
const BUCKET_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// How often quota records from earlier days are dropped.
const QUOTA_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

/// Studio gateway service state
pub struct StudioGateway {
    config: Arc<GatewayConfig>,
    stack: MiddlewareStack,
    studio: Arc<StudioService>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    shutdown_rx: Option<oneshot::Receiver<()>>,
    tasks: Vec<JoinHandle<()>>,
}

impl StudioGateway {
    /// Create the gateway over the given provider ports.
    pub fn new(config: GatewayConfig, ports: StudioPorts) -> Result<Self, GatewayError> {
        config.validate()?;
        let config = Arc::new(config);
        let stack = MiddlewareStack::from_config(&config);
        let studio = Arc::new(StudioService::new(
            Arc::clone(&config),
            ports,
            stack.circuit_breaker(),
            stack.metrics(),
        ));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        Ok(Self {
            config,
            stack,
            studio,
            shutdown_tx: Some(shutdown_tx),
            shutdown_rx: Some(shutdown_rx),
            tasks: Vec::new(),
        })
    }

    /// Log which providers are usable. Missing credentials are not fatal.
    pub fn report_providers(&self) {
        let status = self.studio.provider_status();
        let checks = [
            ("authentication", status.auth),
            ("google sign-in", status.google),
            ("image generation", status.generation),
            ("prompt enhancement", status.enhancement),
            ("image storage", status.storage),
            ("image history", status.history),
        ];
        for (provider, configured) in checks {
            if configured {
                info!(provider, "Provider configured");
            } else {
                warn!(provider, "Provider not configured, related endpoints will answer 503");
            }
        }
    }

    /// Router with every layer applied (useful for in-process tests).
    pub fn router(&self) -> Router {
        build_router(Arc::clone(&self.studio), &self.stack)
    }

    /// Bind the configured address and serve until [`shutdown`](Self::shutdown).
    pub async fn start(&mut self) -> Result<(), GatewayError> {
        if !self.config.http.enabled {
            warn!("HTTP server disabled in configuration");
            return Ok(());
        }
        let addr = self.config.http_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| GatewayError::Bind(format!("{addr}: {e}")))?;
        self.serve(listener).await
    }

    /// Serve on an already-bound listener until the shutdown signal fires.
    pub async fn serve(&mut self, listener: TcpListener) -> Result<(), GatewayError> {
        let shutdown_rx = self.shutdown_rx.take().ok_or(GatewayError::ShuttingDown)?;
        self.start_background_tasks();

        let addr = listener.local_addr()?;
        info!(addr = %addr, "Studio gateway listening");

        let app = self
            .router()
            .into_make_service_with_connect_info::<SocketAddr>();
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
                info!("Received shutdown signal");
            })
            .await;

        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.studio.flush_quota().await;
        if let Err(e) = &result {
            error!(error = %e, "HTTP server error");
        }
        info!("Studio gateway stopped");
        result.map_err(GatewayError::from)
    }

    /// Hand the shutdown trigger to another task (e.g. a Ctrl+C watcher).
    /// After this, [`shutdown`](Self::shutdown) is a no-op.
    pub fn take_shutdown_trigger(&mut self) -> Option<oneshot::Sender<()>> {
        self.shutdown_tx.take()
    }

    /// Trigger graceful shutdown
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }

    pub fn metrics(&self) -> Arc<GatewayMetrics> {
        self.stack.metrics()
    }

    pub fn studio(&self) -> Arc<StudioService> {
        Arc::clone(&self.studio)
    }

    fn start_background_tasks(&mut self) {
        let state = self.stack.rate_limit_state();
        self.tasks.push(tokio::spawn(async move {
            cleanup_task(state, BUCKET_SWEEP_INTERVAL).await;
        }));
        self.tasks
            .push(tokio::spawn(self.studio.quota_cleanup(QUOTA_SWEEP_INTERVAL)));
    }
}
