//! Top-level axum assembly for `tingly`: wraps an already-built ingress router (from
//! `llm::router`) with CORS, the health endpoint, the distributed-tracing layer, and
//! graceful shutdown, then binds and serves it.

#![deny(missing_docs)]

mod cors;
pub mod error;
mod health;
mod logger;
mod tracing;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use config::Config;
use telemetry::TelemetryGuard;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::tracing::TracingLayer;

pub use crate::error::Error;

/// How long a graceful shutdown waits for in-flight requests to drain before the
/// process exits anyway.
const SHUTDOWN_DRAIN_GRACE_PERIOD: Duration = Duration::from_secs(30);

/// Configuration for serving `tingly`.
pub struct ServeConfig {
    /// The socket address (IP and port) the server will bind to.
    pub listen_address: SocketAddr,
    /// The deserialized `tingly` configuration, used for CORS/health/tracing/TLS setup.
    pub config: Config,
    /// The assembled ingress router, already wired to the pipeline (see `llm::router`).
    pub router: Router,
    /// Cancellation token for graceful shutdown.
    pub shutdown_signal: CancellationToken,
    /// Log filter string (e.g. `"info"` or `"server=debug,llm=debug"`).
    pub log_filter: String,
    /// The version string to log on startup.
    pub version: String,
    /// Optional sender to report the bound address back (useful if port 0 was requested).
    pub bound_addr_sender: Option<tokio::sync::oneshot::Sender<SocketAddr>>,
}

/// Starts and runs the `tingly` server with the provided configuration.
pub async fn serve(
    ServeConfig {
        listen_address,
        config,
        router,
        shutdown_signal,
        log_filter,
        version,
        bound_addr_sender,
    }: ServeConfig,
) -> anyhow::Result<()> {
    let _telemetry_guard = init_otel(&config, log_filter).await;

    log::info!("tingly {version}");

    let telemetry_config = Arc::new(config.telemetry.clone());
    let default_cors = config::CorsConfig::default();
    let cors = cors::new_layer(config.server.cors.as_ref().unwrap_or(&default_cors));

    let mut app = router.layer(
        tower::ServiceBuilder::new()
            .layer(cors.clone())
            .layer(TracingLayer::new(telemetry_config, config.server.client_ip.clone())),
    );

    if config.server.health.enabled {
        if let Some(listen) = config.server.health.listen {
            tokio::spawn(health::bind_health_endpoint(listen, config.server.health.clone()));
        } else {
            app = app.merge(health::router(&config.server.health).layer(cors));
        }
    }

    let listener = TcpListener::bind(listen_address).await.map_err(Error::Bind)?;

    if let Some(sender) = bound_addr_sender {
        let addr = listener.local_addr().map_err(Error::Bind)?;
        sender
            .send(addr)
            .map_err(|_| anyhow::anyhow!("failed to send back bound address: receiver dropped"))?;
    }

    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();

    match &config.server.tls {
        Some(tls_config) => {
            let rustls_config = RustlsConfig::from_pem_file(&tls_config.certificate, &tls_config.key)
                .await
                .map_err(|e| Error::Tls(e.to_string()))?;

            log::info!("tingly ingress: https://{listen_address}");

            let handle = axum_server::Handle::new();
            tokio::spawn(watch_for_shutdown(shutdown_signal, handle.clone()));

            axum_server::from_tcp_rustls(listener.into_std().map_err(Error::Bind)?, rustls_config)
                .handle(handle)
                .serve(make_service)
                .await
                .map_err(Error::Server)?;
        }
        None => {
            log::info!("tingly ingress: http://{listen_address}");

            let graceful_signal = shutdown_signal.clone();
            let server = axum::serve(listener, make_service)
                .with_graceful_shutdown(async move { graceful_signal.cancelled().await });

            // `with_graceful_shutdown` stops accepting new connections once the signal
            // fires but otherwise waits unboundedly for in-flight ones to finish; race it
            // against the drain grace period so a stuck connection can't hang shutdown.
            tokio::select! {
                result = server => result.map_err(Error::Server)?,
                () = drain_grace_period(shutdown_signal) => {}
            }
        }
    }

    Ok(())
}

/// Tells `axum-server`'s [`axum_server::Handle`] to start a bounded graceful shutdown
/// once `shutdown_signal` fires, so in-flight requests get [`SHUTDOWN_DRAIN_GRACE_PERIOD`]
/// to finish before connections are forcibly closed.
async fn watch_for_shutdown(shutdown_signal: CancellationToken, handle: axum_server::Handle) {
    shutdown_signal.cancelled().await;
    log::info!("received shutdown signal, draining in-flight requests (grace period {SHUTDOWN_DRAIN_GRACE_PERIOD:?})...");
    handle.graceful_shutdown(Some(SHUTDOWN_DRAIN_GRACE_PERIOD));
}

/// Resolves [`SHUTDOWN_DRAIN_GRACE_PERIOD`] after `shutdown_signal` fires.
async fn drain_grace_period(shutdown_signal: CancellationToken) {
    shutdown_signal.cancelled().await;
    log::info!("received shutdown signal, draining in-flight requests (grace period {SHUTDOWN_DRAIN_GRACE_PERIOD:?})...");
    tokio::time::sleep(SHUTDOWN_DRAIN_GRACE_PERIOD).await;
    log::warn!("drain grace period elapsed, forcing shutdown");
}

async fn init_otel(config: &Config, log_filter: String) -> Option<TelemetryGuard> {
    match telemetry::init(&config.telemetry).await {
        Ok(guard) => {
            let otel_appender = guard.logs_appender().cloned();
            logger::init(&log_filter, otel_appender);

            Some(guard)
        }
        Err(e) => {
            eprintln!("failed to initialize telemetry: {e}");
            logger::init(&log_filter, None);

            None
        }
    }
}
