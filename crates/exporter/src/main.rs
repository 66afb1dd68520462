//! Cost Exporter - long-running Prometheus exporter for cloud costs
//!
//! Runs a collection cycle on a fixed interval and serves the latest results on
//! `/metrics`, with `/healthz` and `/readyz` for probes.

use anyhow::{Context, Result};
use clap::Parser;
use cost_exporter::{api, config::ExporterConfig};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use tracker_lib::{
    health::{components, HealthRegistry},
    observability::{CostMetrics, StructuredLogger},
    CostTracker, MetricsExporterBuilder, TrackerConfig,
};

const EXPORTER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let args = ExporterConfig::parse();
    info!(port = args.port, interval_secs = args.interval, "Starting cost-exporter");

    // Configuration faults are fatal before any cycle runs
    let tracker_config = TrackerConfig::load(args.config.as_deref())
        .context("Failed to load tracker configuration")?;
    let logger = StructuredLogger::new(&args.node_name);
    let tracker = CostTracker::from_config(&tracker_config)
        .context("Invalid tracker configuration")?
        .with_logger(logger.clone());

    let health_registry = HealthRegistry::new();
    health_registry.register(components::PROVIDERS).await;
    health_registry.register(components::NOTIFIER).await;

    let metrics = CostMetrics::new().context("Failed to register metrics")?;

    let exporter = MetricsExporterBuilder::new()
        .tracker(Arc::new(tracker))
        .metrics(metrics.clone())
        .health(health_registry.clone())
        .interval(args.interval())
        .logger(logger.clone())
        .build()?;

    logger.log_startup(EXPORTER_VERSION, args.port, args.interval());

    let app_state = Arc::new(api::AppState::new(health_registry, metrics));
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let mut api_handle = tokio::spawn(api::serve(args.port, app_state));
    let exporter_handle = tokio::spawn(exporter.run(shutdown_rx));

    tokio::select! {
        served = &mut api_handle => {
            let _ = shutdown_tx.send(());
            exporter_handle.await?;

            let err = match served {
                Ok(Ok(())) => anyhow::anyhow!("Metrics server exited unexpectedly"),
                Ok(Err(e)) => e.context("Metrics server failed"),
                Err(e) => anyhow::Error::new(e).context("Metrics server task panicked"),
            };
            error!(error = %format!("{:#}", err), "Shutting down");
            Err(err)
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            info!("Shutdown signal received");

            let _ = shutdown_tx.send(());
            exporter_handle.await?;
            api_handle.abort();
            Ok(())
        }
    }
}
