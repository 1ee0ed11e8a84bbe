//! mixdeck-server: HTTP front for the metadata core.
//!
//! Configuration comes from the environment (see `CoreConfig::from_env`);
//! the flags below override the listen address, database and log format.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use core_runtime::config::CoreConfig;
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
use core_service::api::{build_router, AppState};
use core_service::CoreService;
use tokio::signal;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "mixdeck-server")]
#[command(about = "Metadata aggregation and lyrics cache service")]
#[command(version)]
struct Args {
    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:8080", env = "MIXDECK_BIND")]
    bind: SocketAddr,

    /// SQLite database file, overrides MIXDECK_DATABASE_PATH
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// pretty, json or compact
    #[arg(long, env = "MIXDECK_LOG_FORMAT")]
    log_format: Option<LogFormat>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut logging = LoggingConfig::default();
    if let Some(format) = args.log_format {
        logging = logging.with_format(format);
    }
    init_logging(logging).context("Failed to initialize logging")?;

    info!(
        "Starting mixdeck-server v{} on {}",
        env!("CARGO_PKG_VERSION"),
        args.bind
    );

    let mut config = CoreConfig::from_env().context("Invalid configuration")?;
    if let Some(database) = args.database {
        config.database_path = database;
    }
    info!(database = %config.database_path.display(), "Database path");

    let core = CoreService::bootstrap(config)
        .await
        .context("Failed to start core service")?;
    let app = build_router(AppState::new(core.clone()));

    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .context("Failed to bind to address")?;
    info!("Health check: http://{}/health", args.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    core.shutdown();
    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
