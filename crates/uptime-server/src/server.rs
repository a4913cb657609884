//! Main uptime server implementation.

use crate::api::{self, AppState};
use crate::fanout::FanOut;
use crate::http_server::MetricsServer;
use crate::metrics::MetricsRegistry;
use crate::registry::EndpointRegistry;
use crate::scheduler::Scheduler;
use crate::types::ServerConfig;
use common::{Error, Result};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uptime_probe::{HttpProber, Prober};

/// Uptime monitoring server
pub struct UptimeServer {
    config: ServerConfig,
    prober: Option<Arc<dyn Prober>>,
}

/// Handle to a started server
pub struct RunningServer {
    /// Bound address of the main listener
    pub http_addr: SocketAddr,
    /// Bound address of the metrics listener, when enabled
    pub metrics_addr: Option<SocketAddr>,
    pub registry: Arc<EndpointRegistry>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl UptimeServer {
    /// Create a new uptime server
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            prober: None,
        }
    }

    /// Use `prober` instead of the default HTTP prober
    pub fn with_prober(mut self, prober: Arc<dyn Prober>) -> Self {
        self.prober = Some(prober);
        self
    }

    /// Run until SIGINT or SIGTERM
    pub async fn run(self) -> Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Run until `shutdown` completes, then stop gracefully
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let running = self.start().await?;
        shutdown.await;
        info!("Shutdown signal received");
        running.shutdown().await;
        Ok(())
    }

    /// Bind listeners, register configured endpoints and spawn all tasks
    pub async fn start(self) -> Result<RunningServer> {
        info!("Starting uptime server");
        let config = self.config;
        let service_name: Arc<str> = Arc::from(config.service_name.as_str());

        let metrics = if config.metrics_enabled {
            info!("Metrics enabled on {}", config.metrics_listen_addr);
            Some(Arc::new(MetricsRegistry::new()))
        } else {
            info!("Metrics disabled");
            None
        };

        let prober: Arc<dyn Prober> = match self.prober {
            Some(prober) => prober,
            None => Arc::new(HttpProber::new().map_err(Error::other)?),
        };

        let registry = Arc::new(EndpointRegistry::new());

        // Built before anything is spawned so route conflicts fail startup
        let metrics_server = match metrics {
            Some(ref m) => {
                let server = MetricsServer::new(
                    registry.clone(),
                    m.clone(),
                    service_name.clone(),
                    config.metrics_path.clone(),
                    config.metrics_internal_path.clone(),
                )?;
                let app = server.router();
                Some((server, app))
            }
            None => None,
        };

        let fanout = Arc::new(FanOut::new(config.subscriber_buffer, metrics.clone()));

        let mut scheduler = Scheduler::new(registry.clone(), prober, fanout.clone(), metrics.clone())
            .with_tick_interval(config.tick_interval)
            .with_allow_overlap(config.allow_overlap);
        if let Some(ref m) = metrics {
            scheduler = scheduler.with_observer(m.clone());
        }

        for endpoint in config.endpoints.iter().cloned() {
            registry.add(endpoint).await;
        }
        info!(count = registry.len().await, "Configured endpoints registered");

        let http_listener = bind(&config.listen_addr).await?;
        let http_addr = local_addr(&http_listener, &config.listen_addr)?;

        let metrics_listener = match metrics_server {
            Some(_) => Some(bind(&config.metrics_listen_addr).await?),
            None => None,
        };
        let metrics_addr = match metrics_listener {
            Some(ref listener) => Some(local_addr(listener, &config.metrics_listen_addr)?),
            None => None,
        };

        let cancel = CancellationToken::new();
        let mut tasks = Vec::new();

        // Scheduler
        {
            let scheduler = scheduler.clone();
            let cancel = cancel.clone();
            tasks.push(tokio::spawn(async move {
                scheduler.run(cancel).await;
            }));
        }

        // Main listener
        let app = api::router(
            AppState {
                registry: registry.clone(),
                scheduler,
                fanout,
                metrics,
                service_name,
            },
            config.static_dir.as_deref(),
            config.metrics_enabled,
        );
        {
            let cancel = cancel.clone();
            tasks.push(tokio::spawn(async move {
                info!(listen_addr = %http_addr, "HTTP server listening");
                if let Err(e) = axum::serve(http_listener, app)
                    .with_graceful_shutdown(cancel.cancelled_owned())
                    .await
                {
                    warn!(error = %e, "HTTP server error");
                }
            }));
        }

        // Metrics listener
        if let (Some((server, app)), Some(listener)) = (metrics_server, metrics_listener) {
            let cancel = cancel.clone();
            tasks.push(tokio::spawn(async move {
                if let Err(e) = server.serve_router(app, listener, cancel).await {
                    warn!(error = %e, "Metrics server error");
                }
            }));
        }

        info!("All tasks spawned, server running");

        Ok(RunningServer {
            http_addr,
            metrics_addr,
            registry,
            cancel,
            tasks,
        })
    }
}

impl RunningServer {
    /// Cancel the scheduler and stop both listeners.
    ///
    /// Probes already in flight are not awaited.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Task ended abnormally");
            }
        }
        info!("Uptime server stopped");
    }
}

async fn bind(addr: &str) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| Error::bind(addr, source))
}

fn local_addr(listener: &TcpListener, addr: &str) -> Result<SocketAddr> {
    listener
        .local_addr()
        .map_err(|source| Error::bind(addr, source))
}

/// Resolves on SIGINT, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
