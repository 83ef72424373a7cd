use std::{net::SocketAddr, path::PathBuf};

use clap::Parser;

/// `tingly`: a local-first reverse proxy between AI-coding clients and LLM providers.
#[derive(Debug, Parser)]
#[command(name = "tingly", version)]
pub struct Args {
    /// Path to the configuration file.
    #[arg(long, short, env = "TINGLY_CONFIG", default_value = "tingly.json")]
    pub config: PathBuf,

    /// Overrides the listen address from the configuration file.
    #[arg(long, env = "TINGLY_LISTEN_ADDRESS")]
    pub listen_address: Option<SocketAddr>,

    /// Log filter, e.g. `info` or `server=debug,llm=debug`.
    #[arg(long, env = "TINGLY_LOG", default_value = "info")]
    pub log: String,

    /// Path to the SQLite database backing the OAuth credential vault.
    #[arg(long, env = "TINGLY_VAULT_DB", default_value = "tingly-vault.db")]
    pub vault_db: PathBuf,

    /// Path to the SQLite database backing load-balancer rotation state.
    #[arg(long, env = "TINGLY_ROUTING_DB", default_value = "tingly-routing.db")]
    pub routing_db: PathBuf,

    /// Path to the SQLite database backing the usage recorder.
    #[arg(long, env = "TINGLY_USAGE_DB", default_value = "tingly-usage.db")]
    pub usage_db: PathBuf,
}
