//! Periodic collection loop behind the pull endpoint
//!
//! Runs `Collecting → Publishing → Sleeping` until shut down. The interval is measured
//! from the end of one cycle to the start of the next, so cycles never overlap.

use crate::health::{components, HealthRegistry};
use crate::observability::{CostMetrics, StructuredLogger};
use crate::tracker::{CostTracker, CycleOutcome};
use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::info;

/// Default time between cycles
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(300);

/// Observable exporter state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExporterState {
    Idle,
    Collecting,
    Publishing,
    Sleeping,
    Stopped,
}

pub struct MetricsExporter {
    tracker: Arc<CostTracker>,
    metrics: CostMetrics,
    health: HealthRegistry,
    interval: Duration,
    logger: StructuredLogger,
    state_tx: watch::Sender<ExporterState>,
}

impl MetricsExporter {
    pub fn new(
        tracker: Arc<CostTracker>,
        metrics: CostMetrics,
        health: HealthRegistry,
        interval: Duration,
        logger: StructuredLogger,
    ) -> Self {
        let (state_tx, _) = watch::channel(ExporterState::Idle);
        Self {
            tracker,
            metrics,
            health,
            interval,
            logger,
            state_tx,
        }
    }

    /// Subscribe to state transitions
    pub fn state(&self) -> watch::Receiver<ExporterState> {
        self.state_tx.subscribe()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    fn transition(&self, state: ExporterState) {
        self.state_tx.send_replace(state);
    }

    /// Run one cycle and publish it
    pub async fn run_once(&self) -> CycleOutcome {
        self.transition(ExporterState::Collecting);
        let outcome = self.tracker.run_cycle().await;

        self.transition(ExporterState::Publishing);
        self.metrics.publish(&outcome);
        self.health.record_cycle(&outcome).await;
        self.health.set_ready(true).await;

        outcome
    }

    /// Run cycles until a shutdown signal arrives.
    ///
    /// Shutdown is honoured immediately, abandoning an in-flight cycle if necessary.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.interval.as_secs(),
            providers = self.tracker.providers().len(),
            "Starting cost export loop"
        );
        self.health.register(components::EXPORTER).await;

        loop {
            tokio::select! {
                outcome = self.run_once() => {
                    info!(
                        total_cost = outcome.summary.total_amount,
                        alerts = outcome.alerts.len(),
                        "Published cycle"
                    );
                }
                _ = shutdown.recv() => break,
            }

            self.transition(ExporterState::Sleeping);
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.recv() => break,
            }
        }

        self.transition(ExporterState::Stopped);
        self.health
            .set_unhealthy(components::EXPORTER, "export loop stopped")
            .await;
        self.logger.log_shutdown("shutdown signal received");
    }
}

/// Builder for the export loop
pub struct MetricsExporterBuilder {
    tracker: Option<Arc<CostTracker>>,
    metrics: Option<CostMetrics>,
    health: Option<HealthRegistry>,
    interval: Duration,
    logger: StructuredLogger,
}

impl MetricsExporterBuilder {
    pub fn new() -> Self {
        Self {
            tracker: None,
            metrics: None,
            health: None,
            interval: DEFAULT_INTERVAL,
            logger: StructuredLogger::default(),
        }
    }

    pub fn tracker(mut self, tracker: Arc<CostTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn metrics(mut self, metrics: CostMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn build(self) -> Result<MetricsExporter> {
        let tracker = self
            .tracker
            .ok_or_else(|| anyhow::anyhow!("Tracker is required"))?;
        let metrics = self
            .metrics
            .ok_or_else(|| anyhow::anyhow!("Metrics are required"))?;
        if self.interval.is_zero() {
            anyhow::bail!("Interval must be greater than zero");
        }

        Ok(MetricsExporter::new(
            tracker,
            metrics,
            self.health.unwrap_or_default(),
            self.interval,
            self.logger,
        ))
    }
}

impl Default for MetricsExporterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerting::{AlertEvaluator, NotificationDispatcher};
    use crate::models::Reading;
    use crate::provider::{async_trait, CostProvider, ProviderClient};

    struct SlowProvider {
        delay: Duration,
    }

    #[async_trait]
    impl CostProvider for SlowProvider {
        fn name(&self) -> &str {
            "slow"
        }

        async fn fetch_costs(&self) -> anyhow::Result<Vec<Reading>> {
            tokio::time::sleep(self.delay).await;
            Ok(vec![Reading::new("compute", "slow", 42.0)])
        }
    }

    fn tracker(delay: Duration) -> Arc<CostTracker> {
        Arc::new(CostTracker::new(
            vec![ProviderClient::new(Arc::new(SlowProvider { delay }))],
            AlertEvaluator::default(),
            NotificationDispatcher::new(),
        ))
    }

    #[test]
    fn test_builder_requires_tracker() {
        let result = MetricsExporterBuilder::new()
            .metrics(CostMetrics::new().unwrap())
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_rejects_zero_interval() {
        let result = MetricsExporterBuilder::new()
            .tracker(tracker(Duration::ZERO))
            .metrics(CostMetrics::new().unwrap())
            .interval(Duration::ZERO)
            .build();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_run_once_publishes_and_marks_ready() {
        let metrics = CostMetrics::new().unwrap();
        let health = HealthRegistry::new();
        let exporter = MetricsExporterBuilder::new()
            .tracker(tracker(Duration::ZERO))
            .metrics(metrics.clone())
            .health(health.clone())
            .build()
            .unwrap();

        assert_eq!(*exporter.state().borrow(), ExporterState::Idle);
        let outcome = exporter.run_once().await;

        assert_eq!(outcome.summary.total_amount, 42.0);
        assert_eq!(metrics.cycles(), 1);
        assert!(health.readiness().await.ready);
        assert_eq!(*exporter.state().borrow(), ExporterState::Publishing);
    }

    #[tokio::test]
    async fn test_loop_sleeps_between_cycles_and_stops() {
        let metrics = CostMetrics::new().unwrap();
        let exporter = MetricsExporterBuilder::new()
            .tracker(tracker(Duration::ZERO))
            .metrics(metrics.clone())
            .interval(Duration::from_secs(3600))
            .build()
            .unwrap();
        let mut state = exporter.state();

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(exporter.run(shutdown_rx));

        state
            .wait_for(|s| *s == ExporterState::Sleeping)
            .await
            .unwrap();
        assert_eq!(metrics.cycles(), 1);

        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(*state.borrow(), ExporterState::Stopped);
        assert_eq!(metrics.cycles(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_abandons_in_flight_cycle() {
        let metrics = CostMetrics::new().unwrap();
        let exporter = MetricsExporterBuilder::new()
            .tracker(tracker(Duration::from_secs(3600)))
            .metrics(metrics.clone())
            .build()
            .unwrap();
        let mut state = exporter.state();

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(exporter.run(shutdown_rx));

        state
            .wait_for(|s| *s == ExporterState::Collecting)
            .await
            .unwrap();
        shutdown_tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(metrics.cycles(), 0);
    }
}
