//! Athena server library.
//!
//! Provides a reusable serve function usable from the binary or from
//! integration tests.

#![deny(missing_docs)]

mod logger;

use std::net::SocketAddr;

use anyhow::Context as _;
use config::Config;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub use logger::init as init_logger;

/// Configuration for serving Athena.
pub struct ServeConfig {
    /// The deserialized athena.toml configuration with env overrides applied.
    pub config: Config,
    /// Cancellation token for graceful shutdown.
    pub shutdown_signal: CancellationToken,
    /// The version string to log on startup.
    pub version: String,
    /// Optional oneshot sender to send back the bound address (useful if
    /// port 0 was specified).
    pub bound_addr_sender: Option<tokio::sync::oneshot::Sender<SocketAddr>>,
}

/// Starts and runs the proxy with the provided configuration.
///
/// On shutdown the listener stops accepting new requests and in-flight
/// handlers are given time to drain before the future resolves.
pub async fn serve(
    ServeConfig {
        config,
        shutdown_signal,
        version,
        bound_addr_sender,
    }: ServeConfig,
) -> anyhow::Result<()> {
    log::info!("Athena {version}");

    let listen_address = config.server.listen_address();
    let app = translate::router(config);

    let listener = TcpListener::bind(listen_address)
        .await
        .with_context(|| format!("failed to bind {listen_address}"))?;

    let bound_addr = listener.local_addr().context("failed to read bound address")?;

    if let Some(sender) = bound_addr_sender {
        let _ = sender.send(bound_addr);
    }

    log::info!("Messages endpoint: http://{bound_addr}/v1/messages");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown_signal.cancelled().await })
        .await
        .context("server error")?;

    log::info!("Shutdown complete");

    Ok(())
}
