//! Liveness endpoint for uptime probes
//!
//! - `GET /` - plain "Bot is running"
//! - `GET /health` - JSON status, version and number of running jobs

use crate::config::HealthConfig;
use crate::error::Result;
use crate::registry::TaskRegistry;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use std::future::Future;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Build the liveness router
pub fn create_router(registry: TaskRegistry) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(registry)
}

async fn root() -> &'static str {
    "Bot is running"
}

async fn health_check(State(registry): State<TaskRegistry>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "active_jobs": registry.active_count(),
    }))
}

/// Serve the liveness endpoint until `shutdown` resolves.
///
/// Does nothing when the endpoint is disabled.
pub async fn serve<F>(config: &HealthConfig, registry: TaskRegistry, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if !config.enabled {
        tracing::debug!("liveness endpoint disabled");
        return Ok(());
    }

    let listener = TcpListener::bind(config.bind_address).await?;
    tracing::info!(address = %config.bind_address, "liveness endpoint listening");

    axum::serve(listener, create_router(registry))
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("liveness endpoint stopped");
    Ok(())
}
