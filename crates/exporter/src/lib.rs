//! Long-running Prometheus exporter for cloud costs

pub mod api;
pub mod config;
