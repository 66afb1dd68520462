//! Multi-cloud cost tracking library
//!
//! This crate provides the core functionality for:
//! - Fetching cost readings from AWS, GCP, Azure and static providers
//! - Aggregating readings into per-provider and per-service summaries
//! - Threshold alerting with chat webhook and email delivery
//! - JSON reports and Prometheus exposition
//! - Health checks for the long-running exporter

pub mod aggregate;
pub mod alerting;
pub mod collector;
pub mod config;
pub mod error;
pub mod exporter;
pub mod health;
pub mod models;
pub mod observability;
pub mod provider;
pub mod report;
pub mod tracker;

pub use aggregate::{aggregate, aggregate_at};
pub use config::TrackerConfig;
pub use error::{ConfigError, NotificationError, ReportError};
pub use exporter::{ExporterState, MetricsExporter, MetricsExporterBuilder};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{CostMetrics, StructuredLogger};
pub use report::save_report;
pub use tracker::{CostTracker, CycleOutcome};
