//! GCP billing export backend
//!
//! Runs a BigQuery `jobs.query` against the Cloud Billing export table and sums the
//! previous day's cost per service and region.

use super::{
    async_trait, base_url, bearer_token, billing_window, http_client, parse_amount, CostProvider,
};
use crate::config::ProviderConfig;
use crate::error::ConfigError;
use crate::models::Reading;
use anyhow::{Context, Result};
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};

const DEFAULT_ENDPOINT: &str = "https://bigquery.googleapis.com/";
const TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";
const QUERY_TIMEOUT_MS: u64 = 20_000;

pub struct GcpBillingExport {
    name: String,
    project_id: String,
    billing_table: String,
    endpoint: url::Url,
    client: reqwest::Client,
    token: Option<String>,
}

impl GcpBillingExport {
    pub fn from_config(name: &str, config: &ProviderConfig) -> Result<Self, ConfigError> {
        let project_id = config
            .project_id
            .clone()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ConfigError::missing(name, "project_id"))?;
        let billing_table = config
            .billing_table
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ConfigError::missing(name, "billing_table"))?;

        if !is_valid_identifier(&project_id) {
            return Err(invalid(name, "project_id", "contains unsupported characters"));
        }
        if !is_valid_identifier(&billing_table) || !billing_table.contains('.') {
            return Err(invalid(
                name,
                "billing_table",
                "expected 'dataset.table' or 'project.dataset.table'",
            ));
        }

        Ok(Self {
            name: name.to_string(),
            project_id,
            billing_table,
            endpoint: base_url(name, config, DEFAULT_ENDPOINT)?,
            client: http_client(config.timeout_secs)?,
            token: None,
        })
    }

    /// Use a fixed OAuth token instead of reading it from the environment
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn query_url(&self) -> Result<url::Url> {
        self.endpoint
            .join(&format!("bigquery/v2/projects/{}/queries", self.project_id))
            .context("Failed to build BigQuery query URL")
    }

    fn query(&self) -> String {
        format!(
            "SELECT service.description AS service, location.region AS region, \
             SUM(cost) AS cost, ANY_VALUE(currency) AS currency \
             FROM `{}` \
             WHERE usage_start_time >= TIMESTAMP(@start) AND usage_start_time < TIMESTAMP(@end) \
             GROUP BY service, region \
             ORDER BY cost DESC",
            self.billing_table
        )
    }
}

fn invalid(name: &str, setting: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidSetting {
        name: name.to_string(),
        setting: setting.to_string(),
        reason: reason.to_string(),
    }
}

fn is_valid_identifier(value: &str) -> bool {
    value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

#[async_trait]
impl CostProvider for GcpBillingExport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_costs(&self) -> Result<Vec<Reading>> {
        let token = match &self.token {
            Some(token) => token.clone(),
            None => bearer_token(TOKEN_ENV)?,
        };

        let (start, end) = billing_window(Utc::now());
        let request = serde_json::json!({
            "query": self.query(),
            "useLegacySql": false,
            "timeoutMs": QUERY_TIMEOUT_MS,
            "parameterMode": "NAMED",
            "queryParameters": [
                {
                    "name": "start",
                    "parameterType": { "type": "STRING" },
                    "parameterValue": { "value": start.to_string() }
                },
                {
                    "name": "end",
                    "parameterType": { "type": "STRING" },
                    "parameterValue": { "value": end.to_string() }
                }
            ],
        });

        let response = self
            .client
            .post(self.query_url()?)
            .bearer_auth(token)
            .json(&request)
            .send()
            .await
            .context("Failed to reach BigQuery")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("BigQuery error ({}): {}", status, body);
        }

        let payload: QueryResponse = response
            .json()
            .await
            .context("Failed to parse BigQuery response")?;

        let readings = payload.into_readings(&self.name)?;
        info!(provider = %self.name, services = readings.len(), "GCP costs fetched");
        Ok(readings)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    #[serde(default)]
    rows: Vec<Row>,
    /// Present when the result set continues on further pages
    page_token: Option<String>,
    /// Row count of the whole result, encoded as a string
    total_rows: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Row {
    f: Vec<Cell>,
}

#[derive(Debug, Deserialize)]
struct Cell {
    v: serde_json::Value,
}

impl Row {
    fn text(&self, index: usize) -> Option<&str> {
        self.f.get(index).and_then(|cell| cell.v.as_str())
    }
}

impl QueryResponse {
    /// Rows the server holds beyond this page, if the result was paged
    fn remaining_rows(&self) -> Option<u64> {
        self.page_token.as_ref()?;
        let total = self
            .total_rows
            .as_deref()
            .and_then(|t| t.parse::<u64>().ok())
            .unwrap_or(0);
        Some(total.saturating_sub(self.rows.len() as u64))
    }

    fn into_readings(self, provider: &str) -> Result<Vec<Reading>> {
        if !self.job_complete {
            anyhow::bail!("BigQuery job did not complete within {}ms", QUERY_TIMEOUT_MS);
        }

        if let Some(remaining) = self.remaining_rows() {
            // TODO: follow pageToken through jobs.getQueryResults instead of truncating
            warn!(
                provider = %provider,
                received = self.rows.len(),
                remaining,
                "BigQuery result is paged; only the first page is used"
            );
        }

        let mut readings = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            let service = row.text(0).unwrap_or("unknown");
            let cost = row
                .f
                .get(2)
                .map(|cell| &cell.v)
                .context("BigQuery row is missing the cost column")?;

            let mut reading = Reading::new(service, provider, parse_amount(cost)?);
            if let Some(region) = row.text(1) {
                reading = reading.with_region(region);
            }
            if let Some(currency) = row.text(3) {
                reading = reading.with_currency(currency);
            }
            readings.push(reading);
        }

        Ok(readings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ProviderClient;
    use std::sync::Arc;

    fn config_for(endpoint: &str) -> ProviderConfig {
        ProviderConfig {
            enabled: true,
            project_id: Some("billing-proj".to_string()),
            billing_table: Some("billing.gcp_billing_export_v1".to_string()),
            endpoint: Some(endpoint.to_string()),
            timeout_secs: 5,
            ..ProviderConfig::default()
        }
    }

    #[tokio::test]
    async fn test_fetch_parses_rows() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/bigquery/v2/projects/billing-proj/queries")
            .match_header("authorization", "Bearer test-token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"jobComplete":true,"rows":[
                    {"f":[{"v":"Compute Engine"},{"v":"us-central1"},{"v":"42.10"},{"v":"USD"}]},
                    {"f":[{"v":"Cloud Storage"},{"v":null},{"v":"3.5"},{"v":"EUR"}]}
                ]}"#,
            )
            .create_async()
            .await;

        let provider = GcpBillingExport::from_config("gcp", &config_for(&server.url()))
            .unwrap()
            .with_token("test-token");
        let readings = provider.fetch_costs().await.unwrap();

        mock.assert_async().await;
        assert_eq!(readings.len(), 2);
        assert_eq!(readings[0].service, "Compute Engine");
        assert_eq!(readings[0].region.as_deref(), Some("us-central1"));
        assert_eq!(readings[0].amount, 42.10);
        assert_eq!(readings[1].region_label(), "unknown");
        assert_eq!(readings[1].currency, "EUR");
    }

    #[tokio::test]
    async fn test_incomplete_job_fails_open() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/bigquery/v2/projects/billing-proj/queries")
            .with_status(200)
            .with_body(r#"{"jobComplete":false}"#)
            .create_async()
            .await;

        let provider = GcpBillingExport::from_config("gcp", &config_for(&server.url()))
            .unwrap()
            .with_token("test-token");
        let (readings, attempt) = ProviderClient::new(Arc::new(provider)).fetch().await;

        assert!(readings.is_empty());
        assert!(attempt.error.unwrap().contains("did not complete"));
    }

    #[test]
    fn test_paged_result_reports_remaining_rows() {
        let paged: QueryResponse = serde_json::from_str(
            r#"{
                "jobComplete": true,
                "totalRows": "3",
                "pageToken": "page-2",
                "rows": [{"f": [
                    {"v": "Compute Engine"}, {"v": "us-central1"}, {"v": "4.5"}, {"v": "USD"}
                ]}]
            }"#,
        )
        .unwrap();
        assert_eq!(paged.remaining_rows(), Some(2));

        let readings = paged.into_readings("gcp").unwrap();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].amount, 4.5);

        let complete: QueryResponse =
            serde_json::from_str(r#"{"jobComplete": true, "totalRows": "0"}"#).unwrap();
        assert_eq!(complete.remaining_rows(), None);
    }

    #[test]
    fn test_missing_project_rejected() {
        let config = ProviderConfig {
            enabled: true,
            billing_table: Some("billing.export".to_string()),
            ..ProviderConfig::default()
        };
        let err = GcpBillingExport::from_config("gcp", &config).err().unwrap();
        assert!(matches!(
            err,
            ConfigError::MissingSetting { ref setting, .. } if setting == "project_id"
        ));
    }

    #[test]
    fn test_table_name_validated() {
        let mut config = config_for("http://localhost/");
        config.billing_table = Some("billing.export`; DROP TABLE x".to_string());
        let err = GcpBillingExport::from_config("gcp", &config).err().unwrap();
        assert!(matches!(err, ConfigError::InvalidSetting { .. }));

        config.billing_table = Some("no_dataset".to_string());
        assert!(GcpBillingExport::from_config("gcp", &config).is_err());
    }
}
