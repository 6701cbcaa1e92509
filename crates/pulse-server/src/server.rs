use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::http::{header, Method};
use axum::routing::get;
use axum::Router;
use tokio::sync::oneshot;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::config::ServerConfig;
use crate::handlers;
use crate::orchestrator::ReviewOrchestrator;

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ReviewOrchestrator>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(orchestrator: Arc<ReviewOrchestrator>) -> Self {
        Self {
            orchestrator,
            started_at: Instant::now(),
        }
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route(
            "/reviews",
            get(handlers::list_reviews).post(handlers::submit_review),
        )
        .route("/health", get(handlers::health))
        .with_state(state)
        .layer(TimeoutLayer::new(config.handler_timeout))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Bind and start serving. Returns once the listener is bound.
pub async fn start(
    config: ServerConfig,
    orchestrator: Arc<ReviewOrchestrator>,
) -> Result<ServerHandle, std::io::Error> {
    let state = AppState::new(Arc::clone(&orchestrator));
    let router = build_router(state, &config);

    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    let local_addr = listener.local_addr()?;
    info!(addr = %local_addr, "pulse server started");

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        let result = axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        })
        .await;
        if let Err(e) = result {
            tracing::error!(error = %e, "server terminated with error");
        }
    });

    let sweep_interval = config.sweep_interval.max(std::time::Duration::from_secs(1));
    let sweeper = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = orchestrator.limiter().sweep();
            if removed > 0 {
                debug!(removed, "swept idle rate-limit buckets");
            }
        }
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        addr: local_addr,
        shutdown_tx: Some(shutdown_tx),
        server,
        sweeper,
    })
}

/// Handle returned by `start()`. Dropping it leaves the server running
/// until the runtime shuts down; call [`ServerHandle::shutdown`] to drain.
pub struct ServerHandle {
    pub port: u16,
    pub addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    server: tokio::task::JoinHandle<()>,
    sweeper: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    /// Stop accepting connections and wait for in-flight requests.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.sweeper.abort();
        let _ = (&mut self.server).await;
        info!("pulse server stopped");
    }
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}
