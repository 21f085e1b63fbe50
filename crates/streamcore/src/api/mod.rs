//! HTTP API layer.
//!
//! Thin handlers delegating to the control-plane services; this module wires
//! up the shared `AppState` and binds the listener.

use std::sync::Arc;

use thiserror::Error;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ConfigCatalog;
use crate::context::ControlPlaneContext;
use crate::lifecycle::LifecycleManager;
use crate::store::MetricsStore;

pub mod http;
pub mod response;

/// Errors that can occur when starting the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind to {addr}: {source}")]
    Bind { addr: String, #[source] source: std::io::Error },
    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Shared application state for the API layer.
///
/// A thin wrapper over `Arc`-shared services; all business logic lives in
/// the services themselves.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<ConfigCatalog>,
    pub lifecycle: Arc<LifecycleManager>,
    pub metrics: Arc<MetricsStore>,
    pub ctx: Arc<ControlPlaneContext>,
}

/// Binds and serves the HTTP API on `state.ctx.bind_addr()`.
pub async fn start_server(state: AppState) -> Result<(), ServerError> {
    let addr = state.ctx.bind_addr().to_string();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind { addr: addr.clone(), source })?;

    info!(%addr, "control-plane API listening");

    let app = http::create_router(state).layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive());

    axum::serve(listener, app.into_make_service()).await.map_err(ServerError::Serve)
}
