//! Backend that serves readings declared in configuration
//!
//! Useful for demos, offline runs and tests; each fetch re-stamps the readings with the
//! current time.

use super::{async_trait, CostProvider};
use crate::config::{ProviderConfig, StaticReadingConfig};
use crate::models::Reading;
use anyhow::Result;
use chrono::Utc;

pub struct StaticProvider {
    name: String,
    readings: Vec<StaticReadingConfig>,
}

impl StaticProvider {
    pub fn new(name: impl Into<String>, readings: Vec<StaticReadingConfig>) -> Self {
        Self {
            name: name.into(),
            readings,
        }
    }

    pub fn from_config(name: &str, config: &ProviderConfig) -> Self {
        Self::new(name, config.readings.clone())
    }
}

#[async_trait]
impl CostProvider for StaticProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_costs(&self) -> Result<Vec<Reading>> {
        let now = Utc::now();

        Ok(self
            .readings
            .iter()
            .map(|entry| {
                let mut reading =
                    Reading::new(entry.service.clone(), self.name.clone(), entry.amount)
                        .observed_at(now);
                if let Some(region) = &entry.region {
                    reading = reading.with_region(region.clone());
                }
                if let Some(resource_id) = &entry.resource_id {
                    reading = reading.with_resource_id(resource_id.clone());
                }
                if let Some(currency) = &entry.currency {
                    reading = reading.with_currency(currency.clone());
                }
                for (key, value) in &entry.tags {
                    reading = reading.with_tag(key.clone(), value.clone());
                }
                reading
            })
            .collect())
    }
}
