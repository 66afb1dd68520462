//! One collection cycle: fetch, aggregate, evaluate, notify

use crate::aggregate::aggregate;
use crate::alerting::{AlertEvaluator, DeliveryOutcome, NotificationDispatcher};
use crate::collector::{collect_all, CollectionReport, ReadingStore};
use crate::config::TrackerConfig;
use crate::error::{ConfigError, ReportError};
use crate::models::{AlertRule, Reading, Summary, TriggeredAlert};
use crate::observability::StructuredLogger;
use crate::provider::{create_enabled_providers, FetchAttempt, ProviderClient};
use crate::report::save_report;
use std::path::Path;
use std::time::Instant;
use tracing::info;

/// Everything one cycle produced
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub readings: Vec<Reading>,
    pub summary: Summary,
    pub alerts: Vec<TriggeredAlert>,
    pub deliveries: Vec<DeliveryOutcome>,
    pub attempts: Vec<FetchAttempt>,
}

/// Drives the cost pipeline over a fixed set of providers and rules
pub struct CostTracker {
    providers: Vec<ProviderClient>,
    evaluator: AlertEvaluator,
    dispatcher: NotificationDispatcher,
    store: ReadingStore,
    logger: StructuredLogger,
}

impl CostTracker {
    pub fn new(
        providers: Vec<ProviderClient>,
        evaluator: AlertEvaluator,
        dispatcher: NotificationDispatcher,
    ) -> Self {
        Self {
            providers,
            evaluator,
            dispatcher,
            store: ReadingStore::new(),
            logger: StructuredLogger::default(),
        }
    }

    /// Build providers, rules and channels from a configuration.
    ///
    /// Every configuration fault surfaces here, before any cycle runs.
    pub fn from_config(config: &TrackerConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let providers = create_enabled_providers(config)?;
        let evaluator = AlertEvaluator::new(config.alert_rules()?);
        let dispatcher = NotificationDispatcher::from_config(&config.notifications)?;

        info!(
            providers = providers.len(),
            rules = evaluator.rules().len(),
            "Cost tracker configured"
        );

        Ok(Self::new(providers, evaluator, dispatcher))
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn providers(&self) -> &[ProviderClient] {
        &self.providers
    }

    pub fn rules(&self) -> &[AlertRule] {
        self.evaluator.rules()
    }

    pub fn store(&self) -> &ReadingStore {
        &self.store
    }

    /// Fetch from every provider and replace the stored readings
    pub async fn collect(&self) -> CollectionReport {
        let report = collect_all(&self.providers).await;
        for attempt in &report.attempts {
            self.logger.log_fetch_attempt(attempt);
        }
        self.store.replace(report.readings.clone());
        report
    }

    /// Aggregate the stored readings
    pub fn analyze(&self) -> Summary {
        aggregate(&self.store.readings())
    }

    pub fn check_alerts(&self, summary: &Summary) -> Vec<TriggeredAlert> {
        let alerts = self.evaluator.evaluate(summary);
        for alert in &alerts {
            self.logger.log_alert(alert);
        }
        alerts
    }

    pub async fn notify(&self, alerts: &[TriggeredAlert]) -> Vec<DeliveryOutcome> {
        let deliveries = self.dispatcher.dispatch_all(alerts).await;
        for outcome in &deliveries {
            self.logger.log_delivery(outcome);
        }
        deliveries
    }

    /// Run one full cycle. Never fails; provider and channel faults are recorded in the outcome.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let start = Instant::now();

        let report = self.collect().await;
        let summary = aggregate(&report.readings);
        let alerts = self.check_alerts(&summary);
        let deliveries = self.notify(&alerts).await;

        self.logger
            .log_cycle_complete(&summary, report.readings.len(), alerts.len(), start.elapsed());

        CycleOutcome {
            readings: report.readings,
            summary,
            alerts,
            deliveries,
            attempts: report.attempts,
        }
    }

    /// Persist a summary together with the stored readings
    pub fn save_report(&self, summary: &Summary, path: &Path) -> Result<(), ReportError> {
        save_report(summary, &self.store.readings(), path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::DeliveryStatus;
    use crate::provider::{async_trait, CostProvider};
    use std::sync::Arc;

    struct FixedProvider {
        name: &'static str,
        readings: Vec<(&'static str, f64)>,
    }

    #[async_trait]
    impl CostProvider for FixedProvider {
        fn name(&self) -> &str {
            self.name
        }

        async fn fetch_costs(&self) -> anyhow::Result<Vec<Reading>> {
            Ok(self
                .readings
                .iter()
                .map(|(service, amount)| Reading::new(*service, self.name, *amount))
                .collect())
        }
    }

    struct DownProvider;

    #[async_trait]
    impl CostProvider for DownProvider {
        fn name(&self) -> &str {
            "down"
        }

        async fn fetch_costs(&self) -> anyhow::Result<Vec<Reading>> {
            anyhow::bail!("503 Service Unavailable")
        }
    }

    fn client(name: &'static str, readings: Vec<(&'static str, f64)>) -> ProviderClient {
        ProviderClient::new(Arc::new(FixedProvider { name, readings }))
    }

    fn rule(threshold: f64, channels: &[&str]) -> AlertRule {
        AlertRule {
            name: "daily_threshold_1".to_string(),
            kind: "threshold".to_string(),
            threshold,
            period: "daily".to_string(),
            scoped_services: Vec::new(),
            channels: channels.iter().map(|c| c.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn test_single_provider_scenario() {
        let dispatcher =
            NotificationDispatcher::from_config(&Default::default()).unwrap();
        let tracker = CostTracker::new(
            vec![client("aws", vec![("ec2", 150.50)])],
            AlertEvaluator::new(vec![rule(100.0, &["email"])]),
            dispatcher,
        );

        let outcome = tracker.run_cycle().await;

        assert_eq!(outcome.summary.total_amount, 150.50);
        assert_eq!(outcome.summary.by_provider.get("aws"), Some(150.50));
        assert_eq!(outcome.alerts.len(), 1);
        assert_eq!(outcome.alerts[0].actual, 150.50);
        assert_eq!(outcome.alerts[0].threshold, 100.0);
        // Email is disabled by default
        assert_eq!(outcome.deliveries.len(), 1);
        assert!(matches!(outcome.deliveries[0].status, DeliveryStatus::Skipped(_)));
    }

    #[tokio::test]
    async fn test_no_providers() {
        let tracker = CostTracker::from_config(&TrackerConfig::default()).unwrap();

        let report = tracker.collect().await;
        assert!(report.readings.is_empty());

        let summary = tracker.analyze();
        assert_eq!(summary.total_amount, 0.0);
        assert!(summary.by_service.is_empty());
        assert!(tracker.check_alerts(&summary).is_empty());
    }

    #[tokio::test]
    async fn test_same_service_across_providers() {
        let tracker = CostTracker::new(
            vec![
                client("aws", vec![("storage", 10.0)]),
                client("gcp", vec![("storage", 5.25)]),
            ],
            AlertEvaluator::default(),
            NotificationDispatcher::new(),
        );

        let outcome = tracker.run_cycle().await;
        assert_eq!(outcome.summary.by_service.len(), 1);
        assert_eq!(outcome.summary.by_service.get("storage"), Some(15.25));
    }

    #[tokio::test]
    async fn test_failing_provider_does_not_abort_cycle() {
        let tracker = CostTracker::new(
            vec![
                ProviderClient::new(Arc::new(DownProvider)),
                client("static", vec![("compute", 7.0)]),
            ],
            AlertEvaluator::new(vec![rule(1.0, &[])]),
            NotificationDispatcher::new(),
        );

        let outcome = tracker.run_cycle().await;

        assert_eq!(outcome.summary.total_amount, 7.0);
        assert_eq!(outcome.attempts.len(), 2);
        assert!(!outcome.attempts[0].success);
        assert_eq!(outcome.alerts.len(), 1);
        assert!(outcome.deliveries.is_empty());
    }

    #[tokio::test]
    async fn test_store_replaced_each_cycle() {
        let tracker = CostTracker::new(
            vec![client("aws", vec![("ec2", 1.0), ("s3", 2.0)])],
            AlertEvaluator::default(),
            NotificationDispatcher::new(),
        );

        tracker.run_cycle().await;
        tracker.run_cycle().await;

        assert_eq!(tracker.store().len(), 2);
        assert_eq!(tracker.analyze().total_amount, 3.0);
    }

    #[tokio::test]
    async fn test_from_config_with_static_provider() {
        let config = TrackerConfig::from_yaml_str(
            r#"
providers:
  lab:
    enabled: true
    kind: static
    readings:
      - service: compute
        amount: 120
alerts:
  - threshold: 100
    notification_channels: [slack]
"#,
        )
        .unwrap();
        let tracker = CostTracker::from_config(&config).unwrap();
        assert_eq!(tracker.rules().len(), 1);

        let outcome = tracker.run_cycle().await;
        assert_eq!(outcome.summary.total_amount, 120.0);
        assert_eq!(outcome.alerts.len(), 1);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        tracker.save_report(&outcome.summary, &path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_config_error_surfaces_at_construction() {
        let mut config = TrackerConfig::default();
        config.providers.insert(
            "gcp".to_string(),
            crate::config::ProviderConfig {
                enabled: true,
                ..Default::default()
            },
        );

        let err = CostTracker::from_config(&config).err().unwrap();
        assert!(matches!(err, ConfigError::MissingSetting { .. }));
    }
}
