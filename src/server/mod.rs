//! HTTP service exposing metadata lookup and streaming downloads

pub mod handlers;

use crate::downloader::{Muxer, StreamFetcher};
use crate::extractor::Extractor;
use crate::utils::StreamgrabError;
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

/// Application state shared by all handlers.
///
/// Holds only stateless collaborators; every request owns its own pipeline.
#[derive(Clone)]
pub struct AppState {
    pub extractor: Arc<dyn Extractor>,
    pub fetcher: Arc<dyn StreamFetcher>,
    pub muxer: Arc<dyn Muxer>,
    /// Cancelled on shutdown; each transfer runs under a child token
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        extractor: Arc<dyn Extractor>,
        fetcher: Arc<dyn StreamFetcher>,
        muxer: Arc<dyn Muxer>,
    ) -> Self {
        Self {
            extractor,
            fetcher,
            muxer,
            shutdown: CancellationToken::new(),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/metadata", post(handlers::metadata))
        .route("/download", post(handlers::download))
        .route("/health", get(handlers::health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until Ctrl-C or SIGTERM, then cancel in-flight transfers and drain
pub async fn run_server(state: AppState, addr: SocketAddr) -> Result<(), StreamgrabError> {
    let listener = TcpListener::bind(addr).await?;
    info!("streamgrab listening on http://{}", listener.local_addr()?);

    let shutdown = state.shutdown.clone();
    let app = build_router(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = shutdown.cancelled() => {},
    }

    info!("Shutting down, cancelling in-flight transfers");
    shutdown.cancel();
}
