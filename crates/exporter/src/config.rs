//! Exporter process settings

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Export cloud costs as Prometheus metrics
#[derive(Debug, Clone, Parser)]
#[command(name = "cost-exporter", version, about)]
pub struct ExporterConfig {
    /// Port for the /metrics, /healthz and /readyz endpoints
    #[arg(long, env = "COST_EXPORTER_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Seconds to wait between collection cycles
    #[arg(
        long,
        env = "COST_EXPORTER_INTERVAL",
        default_value_t = 300,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub interval: u64,

    /// Tracker configuration file (defaults to ~/.cost_tracker.yaml)
    #[arg(long, env = "COST_EXPORTER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Name attached to structured log events
    #[arg(long, env = "COST_EXPORTER_NODE_NAME", default_value = "cost-exporter")]
    pub node_name: String,
}

impl ExporterConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }
}
