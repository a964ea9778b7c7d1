//! Storefront HTTP API
//!
//! # Endpoints
//!
//! - `GET /health` - Liveness
//! - `POST /api/stores` - Create a store (`{"name": "..."}`), 201 on success
//! - `GET /api/stores` - All stores, reconciled, newest first
//! - `GET /api/stores/{id}` - One store, reconciled
//! - `DELETE /api/stores/{id}` - Uninstall and forget a store
//! - `GET /api/releases` - Helm releases as the driver sees them
//!
//! Errors are JSON `{"error": ..., "details": ...}` with 400, 404, 409 or 500.

#![deny(missing_docs)]

pub mod error;
mod handlers;

use std::future::Future;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use storefront_provisioner::{Provisioner, StatusReconciler};

pub use error::ApiError;
pub use handlers::CreateStoreRequest;

/// Shared state for handlers
#[derive(Clone)]
pub struct AppState {
    /// Create and delete workflows
    pub provisioner: Arc<Provisioner>,
    /// Read-time reconciliation
    pub reconciler: Arc<StatusReconciler>,
}

/// Build the API router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/api/stores",
            get(handlers::list_stores).post(handlers::create_store),
        )
        .route(
            "/api/stores/{id}",
            get(handlers::get_store).delete(handlers::delete_store),
        )
        .route("/api/releases", get(handlers::list_releases))
        .fallback(handlers::not_found)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the API on `listener` until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(addr = %addr, "starting store API server");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
