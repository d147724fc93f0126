//! Query interface.
//!
//! # Data Flow
//! ```text
//! GET /dynamic?upstream=...
//!     → auth.rs (bearer key, when configured)
//!     → query.rs (query string → Operation)
//!     → registry lookup → Upstream::prepare → Engine::execute
//!     → response.rs (peer list) | error detail
//!
//! GET /upstreams → JSON pool summaries
//! GET /status    → JSON process status
//! ```

pub mod auth;
pub mod handlers;
pub mod query;
pub mod response;

use std::sync::Arc;

use axum::{middleware, routing::{any, get}, Router};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use self::auth::admin_auth_middleware;
use self::handlers::{dynamic, get_status, get_upstreams};
use crate::registry::UpstreamRegistry;
use crate::upstream::engine::Engine;

/// Shared state for every admin handler.
#[derive(Clone)]
pub struct AdminState {
    pub registry: Arc<UpstreamRegistry>,
    pub engine: Arc<Engine>,
    pub api_key: Option<Arc<str>>,
}

impl AdminState {
    pub fn new(registry: Arc<UpstreamRegistry>, engine: Arc<Engine>, api_key: Option<String>) -> Self {
        Self {
            registry,
            engine,
            api_key: api_key.map(Arc::from),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/dynamic", any(dynamic))
        .route("/upstreams", get(get_upstreams))
        .route("/status", get(get_status))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the query interface until shutdown is signalled.
pub async fn serve(
    listener: TcpListener,
    state: AdminState,
    mut shutdown: broadcast::Receiver<()>,
) -> std::io::Result<()> {
    let router = setup_admin_router(state);
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await
}
