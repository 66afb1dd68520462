//! Core data models for the cost tracker

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;

/// Currency assumed when a provider does not report one
pub const DEFAULT_CURRENCY: &str = "USD";

/// A single cost observation reported by one provider
///
/// Readings are created by a provider fetch and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub service: String,
    pub provider: String,
    pub amount: f64,
    pub currency: String,
    pub observed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl Reading {
    /// Create a reading observed now, in the default currency.
    ///
    /// Negative amounts (credits, refunds) and non-finite values are clamped to zero.
    pub fn new(service: impl Into<String>, provider: impl Into<String>, amount: f64) -> Self {
        let service = service.into();
        let amount = if amount.is_finite() && amount > 0.0 {
            amount
        } else {
            if amount != 0.0 {
                tracing::debug!(service = %service, amount, "Clamping non-positive cost to zero");
            }
            0.0
        };

        Self {
            service,
            provider: provider.into(),
            amount,
            currency: DEFAULT_CURRENCY.to_string(),
            observed_at: Utc::now(),
            resource_id: None,
            region: None,
            tags: BTreeMap::new(),
        }
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        let region = region.into();
        self.region = (!region.is_empty()).then_some(region);
        self
    }

    pub fn with_resource_id(mut self, resource_id: impl Into<String>) -> Self {
        let resource_id = resource_id.into();
        self.resource_id = (!resource_id.is_empty()).then_some(resource_id);
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn observed_at(mut self, at: DateTime<Utc>) -> Self {
        self.observed_at = at;
        self
    }

    /// Region label used for metric exposition
    pub fn region_label(&self) -> &str {
        self.region.as_deref().unwrap_or("unknown")
    }
}

/// Ordered name → subtotal mapping
///
/// Serializes as a JSON object whose key order matches the insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Breakdown(Vec<(String, f64)>);

impl Breakdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| *v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn sum(&self) -> f64 {
        self.0.iter().map(|(_, v)| v).sum()
    }
}

impl From<Vec<(String, f64)>> for Breakdown {
    fn from(entries: Vec<(String, f64)>) -> Self {
        Self(entries)
    }
}

impl Serialize for Breakdown {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Aggregated view of one collection cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    #[serde(rename = "total_cost")]
    pub total_amount: f64,
    /// Subtotals in first-seen provider order
    pub by_provider: Breakdown,
    /// Subtotals ordered by descending cost
    pub by_service: Breakdown,
    pub generated_at: DateTime<Utc>,
}

/// A configured threshold bound to a set of notification channels
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertRule {
    pub name: String,
    pub kind: String,
    pub threshold: f64,
    pub period: String,
    /// Services the rule nominally targets. Evaluation still compares the grand total.
    pub scoped_services: Vec<String>,
    pub channels: Vec<String>,
}

/// Event produced when a summary exceeds a rule's threshold
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriggeredAlert {
    pub rule_name: String,
    pub kind: String,
    pub threshold: f64,
    pub actual: f64,
    pub period: String,
    pub channels: Vec<String>,
    pub scoped_services: Vec<String>,
    pub triggered_at: DateTime<Utc>,
}

impl TriggeredAlert {
    /// Amount by which the total exceeded the threshold
    pub fn overage(&self) -> f64 {
        self.actual - self.threshold
    }
}
