use std::{net::SocketAddr, path::PathBuf};

use clap::Parser;

/// An API-translation proxy between the Messages dialect and Chat
/// Completions upstreams.
#[derive(Debug, Parser)]
#[command(name = "athena", version)]
pub struct Args {
    /// Path to the configuration file. When omitted, ./athena.toml is used
    /// if present.
    #[arg(short, long, env = "ATHENA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to listen on, overriding the configuration.
    #[arg(short, long)]
    pub listen_address: Option<SocketAddr>,

    /// Log filter, e.g. "info" or "translate=debug,server=debug".
    #[arg(long)]
    pub log_filter: Option<String>,
}
