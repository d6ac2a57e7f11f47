//! Nosana exporter
//!
//! Polls the Podman API on a fixed interval, counts the containers running
//! Nosana job images and exposes the result as Prometheus metrics.

use anyhow::{Context, Result};
use clap::Parser;
use exporter_lib::{
    collector::{Collector, PodmanClient, PollLoopBuilder},
    health::{components, HealthRegistry},
    observability::{ExporterMetrics, StructuredLogger},
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const EXPORTER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let cli = config::Cli::parse();
    let config = config::ExporterConfig::load(cli)?;
    info!(
        podman_url = %config.podman_url,
        poll_interval_secs = config.poll_interval_secs,
        image_pattern = %config.image_pattern,
        "Exporter configured"
    );

    let metrics = ExporterMetrics::new().context("Failed to register metrics")?;
    metrics.set_running_jobs(0);

    let health_registry = HealthRegistry::new();
    health_registry.register(components::COLLECTOR).await;

    let logger = StructuredLogger::new(&config.podman_url);

    let source = PodmanClient::new(&config.podman_url, config.request_timeout())
        .context("Failed to create Podman API client")?;
    let collector = Collector::new(Arc::new(source), metrics.clone())
        .with_filter(config.image_filter())
        .with_retention(config.image_retention());

    // Binding failure is fatal, there is no fallback port
    let listen_addr = config.listen_address();
    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("Failed to bind metrics server to {}", listen_addr))?;
    logger.log_startup(EXPORTER_VERSION, &listen_addr);

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let poll_loop = PollLoopBuilder::new()
        .collector(Arc::new(collector))
        .interval(config.poll_interval())
        .health(health_registry.clone())
        .build()?;
    let poll_handle = tokio::spawn(poll_loop.run(shutdown_rx));

    health_registry.set_ready(true).await;

    let app_state = Arc::new(api::AppState::new(health_registry, metrics));
    let served = api::serve(listener, app_state, shutdown_signal()).await;

    logger.log_shutdown(shutdown_reason(&served));
    let _ = shutdown_tx.send(());
    poll_handle.await.context("Poll loop task failed")?;

    served
}

/// Why the metrics server stopped
fn shutdown_reason(served: &Result<()>) -> &'static str {
    match served {
        Ok(()) => "signal received",
        Err(_) => "metrics server failed",
    }
}

/// Resolves on SIGINT, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
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
