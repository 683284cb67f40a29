mod cli;

use std::net::TcpListener;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;

use cli::Cli;
use media_range::config::{self, Config};
use media_range::server;
use media_range::supervisor::Supervisor;

async fn start_server(config: Config) -> Result<()> {
    let source = config.media.source();
    let workers = config.server.worker_count();
    let grace_period = config.server.grace_period();

    let listener = TcpListener::bind((config.server.host.as_str(), config.server.port))
        .with_context(|| format!("Failed to bind {}:{}", config.server.host, config.server.port))?;

    tracing::info!(
        "Serving {:?} ({}) at http://{}{} with {} workers",
        source.path,
        source.content_type,
        listener.local_addr()?,
        source.route,
        workers
    );

    let app = server::router(source);

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            tracing::info!("Shutting down...");
            shutdown.cancel();
        }
    });

    Supervisor::new(workers)
        .with_grace_period(grace_period)
        .run(listener, app, shutdown)
        .await
        .context("Server failed")?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG if set, otherwise pick defaults based on the verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "media_range=trace,tower_http=debug".to_string()
        } else {
            "media_range=debug,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    let mut config = config::load_config_or_default(cli.config.as_deref())?;
    cli.apply(&mut config);
    config::validate_config(&config)?;

    let rt = tokio::runtime::Runtime::new()?;
    let result = rt.block_on(start_server(config));

    // connections left over after the grace period are dropped here
    rt.shutdown_timeout(Duration::from_secs(1));
    result
}
