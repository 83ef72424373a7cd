//! Health endpoint: mounted on the main router, or on its own listener when
//! `server.health.listen` is set.

use std::net::SocketAddr;

use axum::{Router, routing::get};
use tokio::net::TcpListener;

use config::HealthConfig;

async fn health() -> &'static str {
    "OK"
}

/// Router for the health endpoint, to be merged onto the main app.
pub fn router(config: &HealthConfig) -> Router {
    Router::new().route(&config.path, get(health))
}

/// Binds and serves the health endpoint on its own listener, independent of the main
/// app's CORS/auth/tracing stack.
pub async fn bind_health_endpoint(listen: SocketAddr, config: HealthConfig) -> anyhow::Result<()> {
    let listener = TcpListener::bind(listen)
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind health endpoint to {listen}: {e}"))?;

    log::info!("health endpoint: http://{listen}{}", config.path);

    axum::serve(listener, router(&config).into_make_service())
        .await
        .map_err(|e| anyhow::anyhow!("health endpoint server error: {e}"))
}
