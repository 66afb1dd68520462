//! AWS Cost Explorer backend
//!
//! Calls `GetCostAndUsage` over the JSON 1.1 protocol with SigV4 signing, asking for the
//! previous day's unblended cost grouped by service.
//!
//! Cost Explorer has one global endpoint in `us-east-1` and its credential scope is always
//! `us-east-1`. A configured `region` is informational and does not change where requests go.

use super::sigv4::{self, SigningParams};
use super::{async_trait, base_url, billing_window, http_client, parse_amount, CostProvider};
use crate::config::ProviderConfig;
use crate::error::ConfigError;
use crate::models::Reading;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::info;

const DEFAULT_REGION: &str = "us-east-1";
/// Region of the global Cost Explorer endpoint and of its credential scope
const SIGNING_REGION: &str = "us-east-1";
const DEFAULT_ENDPOINT: &str = "https://ce.us-east-1.amazonaws.com/";
const TARGET: &str = "AWSInsightsIndexService.GetCostAndUsage";
const CONTENT_TYPE: &str = "application/x-amz-json-1.1";
const COST_METRIC: &str = "UnblendedCost";

/// Static credentials used to sign Cost Explorer requests
#[derive(Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl AwsCredentials {
    /// Read credentials from the standard `AWS_*` environment variables
    pub fn from_env() -> Result<Self> {
        let access_key_id =
            std::env::var("AWS_ACCESS_KEY_ID").context("AWS_ACCESS_KEY_ID is not set")?;
        let secret_access_key =
            std::env::var("AWS_SECRET_ACCESS_KEY").context("AWS_SECRET_ACCESS_KEY is not set")?;
        let session_token = std::env::var("AWS_SESSION_TOKEN")
            .ok()
            .filter(|t| !t.is_empty());

        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }
}

impl std::fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .finish_non_exhaustive()
    }
}

pub struct AwsCostExplorer {
    name: String,
    /// Region named in the configuration, reported in logs only
    region: String,
    endpoint: url::Url,
    client: reqwest::Client,
    /// Fixed credentials; when absent they are read from the environment on each fetch
    credentials: Option<AwsCredentials>,
}

impl AwsCostExplorer {
    pub fn from_config(name: &str, config: &ProviderConfig) -> Result<Self, ConfigError> {
        let region = config
            .region
            .clone()
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        Ok(Self {
            name: name.to_string(),
            endpoint: base_url(name, config, DEFAULT_ENDPOINT)?,
            region,
            client: http_client(config.timeout_secs)?,
            credentials: None,
        })
    }

    pub fn with_credentials(mut self, credentials: AwsCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    fn host_header(&self) -> Result<String> {
        let host = self
            .endpoint
            .host_str()
            .context("Cost Explorer endpoint has no host")?;
        Ok(match self.endpoint.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        })
    }

    fn signed_headers(
        &self,
        credentials: &AwsCredentials,
        body: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Vec<(String, String)>> {
        let host = self.host_header()?;
        Ok(sigv4::sign(&SigningParams {
            access_key_id: &credentials.access_key_id,
            secret_access_key: &credentials.secret_access_key,
            session_token: credentials.session_token.as_deref(),
            region: SIGNING_REGION,
            service: "ce",
            host: &host,
            path: self.endpoint.path(),
            headers: &[("content-type", CONTENT_TYPE), ("x-amz-target", TARGET)],
            body,
            timestamp: now,
        }))
    }
}

#[async_trait]
impl CostProvider for AwsCostExplorer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_costs(&self) -> Result<Vec<Reading>> {
        let credentials = match &self.credentials {
            Some(credentials) => credentials.clone(),
            None => AwsCredentials::from_env()?,
        };

        let now = Utc::now();
        let (start, end) = billing_window(now);
        let body = serde_json::to_vec(&serde_json::json!({
            "TimePeriod": { "Start": start.to_string(), "End": end.to_string() },
            "Granularity": "DAILY",
            "Metrics": [COST_METRIC],
            "GroupBy": [{ "Type": "DIMENSION", "Key": "SERVICE" }],
        }))?;

        let signed = self.signed_headers(&credentials, &body, now)?;

        let mut request = self.client.post(self.endpoint.clone()).body(body);
        for (name, value) in &signed {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .context("Failed to reach Cost Explorer")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Cost Explorer error ({}): {}", status, body);
        }

        let payload: GetCostAndUsageResponse = response
            .json()
            .await
            .context("Failed to parse Cost Explorer response")?;

        let readings = payload.into_readings(&self.name)?;
        info!(
            provider = %self.name,
            region = %self.region,
            services = readings.len(),
            "AWS costs fetched"
        );
        Ok(readings)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetCostAndUsageResponse {
    #[serde(default)]
    results_by_time: Vec<ResultByTime>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ResultByTime {
    #[serde(default)]
    groups: Vec<Group>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Group {
    #[serde(default)]
    keys: Vec<String>,
    #[serde(default)]
    metrics: HashMap<String, MetricValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MetricValue {
    amount: serde_json::Value,
    unit: Option<String>,
}

impl GetCostAndUsageResponse {
    fn into_readings(self, provider: &str) -> Result<Vec<Reading>> {
        let mut readings = Vec::new();

        for group in self.results_by_time.into_iter().flat_map(|r| r.groups) {
            let Some(service) = group.keys.first() else {
                continue;
            };
            let Some(metric) = group.metrics.get(COST_METRIC) else {
                continue;
            };

            let amount = parse_amount(&metric.amount)
                .with_context(|| format!("Bad amount for service {}", service))?;
            let mut reading = Reading::new(service.clone(), provider, amount);
            if let Some(unit) = &metric.unit {
                reading = reading.with_currency(unit.clone());
            }
            readings.push(reading);
        }

        Ok(readings)
    }
}
