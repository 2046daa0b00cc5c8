use args::Args;
use clap::Parser as _;
use server::ServeConfig;
use tokio_util::sync::CancellationToken;

mod args;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = config::Config::load(args.config.as_deref())?;

    if let Some(listen_address) = args.listen_address {
        config.server.listen_address = Some(listen_address);
    }

    if let Some(filter) = args.log_filter {
        config.log.filter = filter;
    }

    server::init_logger(&config.log)?;

    let shutdown_signal = CancellationToken::new();
    spawn_signal_listener(shutdown_signal.clone());

    server::serve(ServeConfig {
        config,
        shutdown_signal,
        version: env!("CARGO_PKG_VERSION").to_string(),
        bound_addr_sender: None,
    })
    .await
}

/// Cancel the token on SIGINT or SIGTERM so in-flight requests can drain.
fn spawn_signal_listener(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};

            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(err) => {
                    log::error!("Failed to install SIGTERM handler: {err}");
                    return;
                }
            };

            tokio::select! {
                _ = ctrl_c => log::info!("Received SIGINT, shutting down"),
                _ = sigterm.recv() => log::info!("Received SIGTERM, shutting down"),
            }
        }

        #[cfg(not(unix))]
        {
            if ctrl_c.await.is_ok() {
                log::info!("Received interrupt, shutting down");
            }
        }

        shutdown.cancel();
    });
}
