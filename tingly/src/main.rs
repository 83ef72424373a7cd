use clap::Parser;
use tokio_util::sync::CancellationToken;

use args::Args;

mod args;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = config::Config::load(&args.config)?;

    let listen_address = args
        .listen_address
        .or(config.server.listen_address)
        .ok_or_else(|| anyhow::anyhow!("no listen address: pass --listen-address or set server.listen_address"))?;

    let vault_store = vault::CredentialStore::open(&args.vault_db)?;
    let vault = vault::Vault::new(reqwest::Client::new(), vault_store);

    let rotation_store = routing::SqliteRotationStore::open(&args.routing_db)?;

    let usage_store = usage::UsageStore::open(&args.usage_db)?;
    let shutdown = CancellationToken::new();
    let (recorder, usage_handle) = usage::spawn(usage_store, shutdown.clone());

    let router = llm::router(config.clone(), vault, recorder, rotation_store, shutdown.clone());

    tokio::spawn(watch_for_termination(shutdown.clone()));

    server::serve(server::ServeConfig {
        listen_address,
        config,
        router,
        shutdown_signal: shutdown,
        log_filter: args.log,
        version: env!("CARGO_PKG_VERSION").to_string(),
        bound_addr_sender: None,
    })
    .await?;

    usage_handle.await?;
    fastrace::flush();

    Ok(())
}

/// Cancels `shutdown` on Ctrl+C or, on Unix, SIGTERM.
async fn watch_for_termination(shutdown: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    log::info!("shutdown signal received");
    shutdown.cancel();
}
