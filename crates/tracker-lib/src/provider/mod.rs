//! Cost readings from cloud billing APIs
//!
//! Each backend implements [`CostProvider`]. Backends are free to fail; the
//! [`ProviderClient`] wrapper converts every failure into an empty reading set plus a
//! failed [`FetchAttempt`], so one provider's outage never aborts a collection cycle.

mod aws;
mod azure;
mod gcp;
mod sigv4;
mod static_provider;

pub use aws::{AwsCostExplorer, AwsCredentials};
pub use azure::AzureCostManagement;
pub use gcp::GcpBillingExport;
pub use static_provider::StaticProvider;

use crate::config::{ProviderConfig, TrackerConfig};
use crate::error::ConfigError;
use crate::models::Reading;
use anyhow::Result;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub use async_trait::async_trait;

/// Trait for billing backends
#[async_trait]
pub trait CostProvider: Send + Sync {
    /// Provider name used to label readings and metrics
    fn name(&self) -> &str;

    /// Query the billing API for the current window
    async fn fetch_costs(&self) -> Result<Vec<Reading>>;
}

/// Supported backend kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Aws,
    Gcp,
    Azure,
    Static,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Aws => "aws",
            ProviderKind::Gcp => "gcp",
            ProviderKind::Azure => "azure",
            ProviderKind::Static => "static",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "aws" => Ok(ProviderKind::Aws),
            "gcp" => Ok(ProviderKind::Gcp),
            "azure" => Ok(ProviderKind::Azure),
            "static" => Ok(ProviderKind::Static),
            other => Err(format!("unknown provider kind: {}", other)),
        }
    }
}

/// Outcome of one provider fetch, kept for observability
#[derive(Debug, Clone)]
pub struct FetchAttempt {
    pub provider: String,
    pub success: bool,
    pub duration: Duration,
    pub reading_count: usize,
    pub error: Option<String>,
}

impl FetchAttempt {
    /// Status label used by the fetch counter
    pub fn status(&self) -> &'static str {
        if self.success {
            "success"
        } else {
            "failure"
        }
    }

    pub(crate) fn failed(provider: impl Into<String>, duration: Duration, error: String) -> Self {
        Self {
            provider: provider.into(),
            success: false,
            duration,
            reading_count: 0,
            error: Some(error),
        }
    }
}

/// Fail-open wrapper around a billing backend
#[derive(Clone)]
pub struct ProviderClient {
    inner: Arc<dyn CostProvider>,
}

impl ProviderClient {
    pub fn new(inner: Arc<dyn CostProvider>) -> Self {
        Self { inner }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// Fetch readings, converting any backend error into an empty result
    pub async fn fetch(&self) -> (Vec<Reading>, FetchAttempt) {
        let start = Instant::now();
        let result = self.inner.fetch_costs().await;
        let duration = start.elapsed();

        match result {
            Ok(readings) => {
                debug!(
                    provider = %self.name(),
                    readings = readings.len(),
                    elapsed_ms = duration.as_millis() as u64,
                    "Provider fetch succeeded"
                );
                let attempt = FetchAttempt {
                    provider: self.name().to_string(),
                    success: true,
                    duration,
                    reading_count: readings.len(),
                    error: None,
                };
                (readings, attempt)
            }
            Err(e) => {
                warn!(
                    provider = %self.name(),
                    error = %format!("{:#}", e),
                    elapsed_ms = duration.as_millis() as u64,
                    "Provider fetch failed, continuing without its readings"
                );
                (
                    Vec::new(),
                    FetchAttempt::failed(self.name(), duration, format!("{:#}", e)),
                )
            }
        }
    }
}

/// Create the backend for one provider entry
pub fn create_provider(
    name: &str,
    config: &ProviderConfig,
) -> Result<Arc<dyn CostProvider>, ConfigError> {
    let kind_name = config.kind_name(name);
    let kind = ProviderKind::from_str(kind_name).map_err(|_| ConfigError::UnsupportedProvider {
        name: name.to_string(),
        kind: kind_name.to_string(),
    })?;

    let provider: Arc<dyn CostProvider> = match kind {
        ProviderKind::Aws => Arc::new(AwsCostExplorer::from_config(name, config)?),
        ProviderKind::Gcp => Arc::new(GcpBillingExport::from_config(name, config)?),
        ProviderKind::Azure => Arc::new(AzureCostManagement::from_config(name, config)?),
        ProviderKind::Static => Arc::new(StaticProvider::from_config(name, config)),
    };

    tracing::info!(provider = %name, kind = %kind, "Configured cost provider");
    Ok(provider)
}

/// Create clients for every enabled provider, in name order
pub fn create_enabled_providers(
    config: &TrackerConfig,
) -> Result<Vec<ProviderClient>, ConfigError> {
    config
        .enabled_providers()
        .map(|(name, provider)| create_provider(name, provider).map(ProviderClient::new))
        .collect()
}

/// The billing window queried each cycle: the previous full UTC day
pub(crate) fn billing_window(now: DateTime<Utc>) -> (NaiveDate, NaiveDate) {
    let end = now.date_naive();
    let start = end - ChronoDuration::days(1);
    (start, end)
}

pub(crate) fn http_client(timeout_secs: u64) -> Result<reqwest::Client, ConfigError> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .build()?)
}

/// Base URL for a provider, honouring an `endpoint` override
pub(crate) fn base_url(
    name: &str,
    config: &ProviderConfig,
    default: &str,
) -> Result<url::Url, ConfigError> {
    let raw = config.endpoint.as_deref().unwrap_or(default);
    url::Url::parse(raw).map_err(|e| ConfigError::InvalidSetting {
        name: name.to_string(),
        setting: "endpoint".to_string(),
        reason: e.to_string(),
    })
}

/// Read a bearer token from the environment at fetch time
pub(crate) fn bearer_token(var: &str) -> Result<String> {
    match std::env::var(var) {
        Ok(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
        _ => anyhow::bail!("{} is not set", var),
    }
}

/// Parse an amount that billing APIs may encode as either a JSON number or a string
pub(crate) fn parse_amount(value: &serde_json::Value) -> Result<f64> {
    match value {
        serde_json::Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| anyhow::anyhow!("cost is not representable: {}", n)),
        serde_json::Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|e| anyhow::anyhow!("invalid cost '{}': {}", s, e)),
        other => anyhow::bail!("unexpected cost value: {}", other),
    }
}
