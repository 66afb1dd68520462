//! Health tracking for the exporter
//!
//! Components report their status after every cycle; `/healthz` and `/readyz` read it.

use crate::tracker::CycleOutcome;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Health status of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    /// Every fetch or delivery in the last cycle succeeded
    Healthy,
    /// Operational, but the last cycle saw failures
    Degraded,
    /// Component has stopped
    Unhealthy,
}

impl ComponentStatus {
    /// Returns true if the component is at least partially operational
    pub fn is_operational(&self) -> bool {
        matches!(self, ComponentStatus::Healthy | ComponentStatus::Degraded)
    }
}

/// Status of one component, stamped with when it was last set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    fn with_status(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn healthy() -> Self {
        Self::with_status(ComponentStatus::Healthy, None)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::with_status(ComponentStatus::Degraded, Some(message.into()))
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::with_status(ComponentStatus::Unhealthy, Some(message.into()))
    }
}

/// Overall health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: HashMap<String, ComponentHealth>,
}

impl HealthResponse {
    /// Worst status across all components
    pub fn compute_status(components: &HashMap<String, ComponentHealth>) -> ComponentStatus {
        let mut has_degraded = false;

        for health in components.values() {
            match health.status {
                ComponentStatus::Unhealthy => return ComponentStatus::Unhealthy,
                ComponentStatus::Degraded => has_degraded = true,
                ComponentStatus::Healthy => {}
            }
        }

        if has_degraded {
            ComponentStatus::Degraded
        } else {
            ComponentStatus::Healthy
        }
    }
}

/// Readiness response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Component names for health tracking
pub mod components {
    pub const PROVIDERS: &str = "providers";
    pub const NOTIFIER: &str = "notifier";
    pub const EXPORTER: &str = "exporter";
}

/// Shared registry of component health
#[derive(Debug, Clone)]
pub struct HealthRegistry {
    components: Arc<RwLock<HashMap<String, ComponentHealth>>>,
    ready: Arc<RwLock<bool>>,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self {
            components: Arc::new(RwLock::new(HashMap::new())),
            ready: Arc::new(RwLock::new(false)),
        }
    }

    /// Register a component with initial healthy status
    pub async fn register(&self, name: &str) {
        let mut components = self.components.write().await;
        components.insert(name.to_string(), ComponentHealth::healthy());
    }

    /// Update component health status
    pub async fn update(&self, name: &str, health: ComponentHealth) {
        let mut components = self.components.write().await;
        components.insert(name.to_string(), health);
    }

    /// Mark component as healthy
    pub async fn set_healthy(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    /// Mark component as degraded
    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::degraded(message)).await;
    }

    /// Mark component as unhealthy
    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::unhealthy(message)).await;
    }

    /// Set readiness; the exporter flips it after its first published cycle
    pub async fn set_ready(&self, ready: bool) {
        let mut r = self.ready.write().await;
        *r = ready;
    }

    /// Update provider and notifier health from a finished cycle
    pub async fn record_cycle(&self, outcome: &CycleOutcome) {
        let failed: Vec<&str> = outcome
            .attempts
            .iter()
            .filter(|a| !a.success)
            .map(|a| a.provider.as_str())
            .collect();
        if failed.is_empty() {
            self.set_healthy(components::PROVIDERS).await;
        } else {
            self.set_degraded(
                components::PROVIDERS,
                format!("fetch failed for: {}", failed.join(", ")),
            )
            .await;
        }

        let undelivered: Vec<&str> = outcome
            .deliveries
            .iter()
            .filter(|d| d.is_failure())
            .map(|d| d.channel.as_str())
            .collect();
        if undelivered.is_empty() {
            self.set_healthy(components::NOTIFIER).await;
        } else {
            self.set_degraded(
                components::NOTIFIER,
                format!("delivery failed on: {}", undelivered.join(", ")),
            )
            .await;
        }
    }

    /// Get overall health status
    pub async fn health(&self) -> HealthResponse {
        let components = self.components.read().await.clone();
        let status = HealthResponse::compute_status(&components);
        HealthResponse { status, components }
    }

    /// Get readiness status
    pub async fn readiness(&self) -> ReadinessResponse {
        let ready = *self.ready.read().await;
        let health = self.health().await;

        if !ready {
            ReadinessResponse {
                ready: false,
                reason: Some("No cycle published yet".to_string()),
            }
        } else if health.status == ComponentStatus::Unhealthy {
            ReadinessResponse {
                ready: false,
                reason: Some("Critical component unhealthy".to_string()),
            }
        } else {
            ReadinessResponse {
                ready: true,
                reason: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate;
    use crate::alerting::{DeliveryOutcome, DeliveryStatus};
    use crate::provider::FetchAttempt;
    use std::time::Duration;

    fn cycle(fetch_ok: bool, delivery: DeliveryStatus) -> CycleOutcome {
        CycleOutcome {
            readings: Vec::new(),
            summary: aggregate(&[]),
            alerts: Vec::new(),
            deliveries: vec![DeliveryOutcome {
                rule_name: "r".to_string(),
                channel: "slack".to_string(),
                status: delivery,
                sent_at: chrono::Utc::now(),
            }],
            attempts: vec![FetchAttempt {
                provider: "aws".to_string(),
                success: fetch_ok,
                duration: Duration::from_millis(5),
                reading_count: 0,
                error: None,
            }],
        }
    }

    #[tokio::test]
    async fn test_initial_state() {
        let registry = HealthRegistry::new();
        let health = registry.health().await;

        assert_eq!(health.status, ComponentStatus::Healthy);
        assert!(health.components.is_empty());
    }

    #[tokio::test]
    async fn test_component_registration() {
        let registry = HealthRegistry::new();
        registry.register(components::PROVIDERS).await;

        let health = registry.health().await;
        assert_eq!(
            health.components[components::PROVIDERS].status,
            ComponentStatus::Healthy
        );
    }

    #[tokio::test]
    async fn test_failed_fetch_degrades_providers() {
        let registry = HealthRegistry::new();
        registry
            .record_cycle(&cycle(false, DeliveryStatus::Delivered))
            .await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Degraded);
        assert_eq!(
            health.components[components::PROVIDERS].status,
            ComponentStatus::Degraded
        );
        assert!(health.components[components::PROVIDERS]
            .message
            .as_deref()
            .unwrap()
            .contains("aws"));
        assert_eq!(
            health.components[components::NOTIFIER].status,
            ComponentStatus::Healthy
        );
    }

    #[tokio::test]
    async fn test_failed_delivery_degrades_notifier() {
        let registry = HealthRegistry::new();
        registry
            .record_cycle(&cycle(true, DeliveryStatus::Failed("timeout".to_string())))
            .await;

        let health = registry.health().await;
        assert_eq!(
            health.components[components::NOTIFIER].status,
            ComponentStatus::Degraded
        );
    }

    #[tokio::test]
    async fn test_skipped_delivery_is_healthy() {
        let registry = HealthRegistry::new();
        registry
            .record_cycle(&cycle(true, DeliveryStatus::Skipped("disabled".to_string())))
            .await;

        assert_eq!(registry.health().await.status, ComponentStatus::Healthy);
    }

    #[tokio::test]
    async fn test_recovery_after_clean_cycle() {
        let registry = HealthRegistry::new();
        registry
            .record_cycle(&cycle(false, DeliveryStatus::Delivered))
            .await;
        registry
            .record_cycle(&cycle(true, DeliveryStatus::Delivered))
            .await;

        assert_eq!(registry.health().await.status, ComponentStatus::Healthy);
    }

    #[tokio::test]
    async fn test_readiness() {
        let registry = HealthRegistry::new();
        assert!(!registry.readiness().await.ready);

        registry.set_ready(true).await;
        assert!(registry.readiness().await.ready);

        registry.set_unhealthy(components::EXPORTER, "stopped").await;
        assert!(!registry.readiness().await.ready);
    }
}
