//! mktxp Binary Entry Point
//!
//! Loads the configuration directory, starts every enabled device and serves
//! the collected metrics until SIGINT or SIGTERM.
//! Core functionality is provided by the `mktxp` library crate.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use mktxp::{
    AppConfig, CollectorRegistry, Orchestrator, PollSettings, RouterOsConnector,
    server::{AppState, create_router},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// mktxp - RouterOS Metrics Exporter
#[derive(Parser, Debug)]
#[command(name = "mktxp", version, about, long_about = None)]
struct Cli {
    /// Directory holding `_mktxp.conf` and `mktxp.conf`
    #[arg(long, default_value = "./", env = "MKTXP_CFG_DIR")]
    cfg_dir: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match AppConfig::load_dir(&cli.cfg_dir) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Initialize tracing
    let default_filter = if config.global.verbose_mode {
        "debug"
    } else {
        "info,mktxp=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("mktxp - RouterOS Metrics Exporter");

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Exporter stopped with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = config.global.listen_addr()?;
    let devices = config.devices.enabled();
    tracing::info!(
        configured = config.devices.len(),
        enabled = devices.len(),
        "Loaded device configuration"
    );

    let orchestrator = Orchestrator::new(
        Arc::new(CollectorRegistry::with_system_collectors()),
        Arc::new(RouterOsConnector),
        prometheus::Registry::new(),
        PollSettings::from(&config.global),
    );

    // Every device is declared and collected once before the listener binds.
    let pollers = orchestrator.start(devices).await;
    for failure in pollers.failures() {
        tracing::warn!(device = %failure.device(), error = %failure, "Device left out");
    }

    let app = create_router(AppState {
        sink: orchestrator.sink().clone(),
        devices: pollers.len(),
    });

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Metrics available at: http://{}/metrics", addr);
    tracing::info!("Press Ctrl+C to shutdown");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    tracing::info!("Shutting down pollers...");
    let report = pollers.shutdown().await;
    if report.timed_out() {
        tracing::warn!(aborted = ?report.aborted, "Some pollers did not stop in time");
    }

    served?;
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }
}
