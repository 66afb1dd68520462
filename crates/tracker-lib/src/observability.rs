//! Observability infrastructure for the cost tracker
//!
//! Provides:
//! - Prometheus metrics for the pull endpoint, held in an explicitly owned registry
//! - Structured event logging with tracing

use crate::aggregate::MONTHLY_PROJECTION_FACTOR;
use crate::alerting::{DeliveryOutcome, DeliveryStatus};
use crate::models::{Summary, TriggeredAlert};
use crate::provider::FetchAttempt;
use crate::tracker::CycleOutcome;
use prometheus::{
    Encoder, GaugeVec, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Histogram buckets for provider fetch latency (in seconds)
const FETCH_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

/// Provider label used on alert counters; rules compare the grand total across providers
pub const ALL_PROVIDERS_LABEL: &str = "all";

struct CostMetricsInner {
    registry: Registry,
    cost_total: GaugeVec,
    cost_daily: GaugeVec,
    cost_monthly_projection: GaugeVec,
    fetch_total: IntCounterVec,
    alerts_total: IntCounterVec,
    fetch_duration_seconds: HistogramVec,
    cycles_total: IntCounter,
    /// Held for writing while a cycle is published and for reading while scraping
    publish_lock: RwLock<()>,
}

/// Cost metrics for Prometheus exposition
///
/// Clones share the same registry and series.
#[derive(Clone)]
pub struct CostMetrics {
    inner: Arc<CostMetricsInner>,
}

impl CostMetrics {
    /// Create a fresh registry with every cost metric registered
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let cost_total = GaugeVec::new(
            Opts::new("cloud_cost_total", "Cloud cost by provider, service and region"),
            &["provider", "service", "region"],
        )?;
        let cost_daily = GaugeVec::new(
            Opts::new("cloud_cost_daily", "Daily cloud cost by provider"),
            &["provider"],
        )?;
        let cost_monthly_projection = GaugeVec::new(
            Opts::new(
                "cloud_cost_monthly_projection",
                "Projected monthly cloud cost by provider",
            ),
            &["provider"],
        )?;
        let fetch_total = IntCounterVec::new(
            Opts::new("cost_fetch_total", "Total cost fetch attempts"),
            &["provider", "status"],
        )?;
        let alerts_total = IntCounterVec::new(
            Opts::new("cost_alerts_total", "Total cost alerts triggered"),
            &["alert_type", "provider"],
        )?;
        let fetch_duration_seconds = HistogramVec::new(
            HistogramOpts::new("cost_fetch_duration_seconds", "Time spent fetching costs")
                .buckets(FETCH_BUCKETS.to_vec()),
            &["provider"],
        )?;
        let cycles_total = IntCounter::new(
            "cost_exporter_cycles_total",
            "Total collection cycles published",
        )?;

        registry.register(Box::new(cost_total.clone()))?;
        registry.register(Box::new(cost_daily.clone()))?;
        registry.register(Box::new(cost_monthly_projection.clone()))?;
        registry.register(Box::new(fetch_total.clone()))?;
        registry.register(Box::new(alerts_total.clone()))?;
        registry.register(Box::new(fetch_duration_seconds.clone()))?;
        registry.register(Box::new(cycles_total.clone()))?;

        Ok(Self {
            inner: Arc::new(CostMetricsInner {
                registry,
                cost_total,
                cost_daily,
                cost_monthly_projection,
                fetch_total,
                alerts_total,
                fetch_duration_seconds,
                cycles_total,
                publish_lock: RwLock::new(()),
            }),
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Replace the cost gauges with a cycle's results and bump the counters.
    ///
    /// Series from earlier cycles that are absent from this one are removed. A concurrent
    /// [`render`](Self::render) sees either the previous or the new snapshot, never a mix.
    pub fn publish(&self, outcome: &CycleOutcome) {
        let inner = &self.inner;
        let _guard = match inner.publish_lock.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut per_series: BTreeMap<(&str, &str, &str), f64> = BTreeMap::new();
        for reading in &outcome.readings {
            *per_series
                .entry((
                    reading.provider.as_str(),
                    reading.service.as_str(),
                    reading.region_label(),
                ))
                .or_insert(0.0) += reading.amount;
        }

        inner.cost_total.reset();
        for ((provider, service, region), amount) in per_series {
            inner
                .cost_total
                .with_label_values(&[provider, service, region])
                .set(amount);
        }

        inner.cost_daily.reset();
        inner.cost_monthly_projection.reset();
        for (provider, subtotal) in outcome.summary.by_provider.iter() {
            inner.cost_daily.with_label_values(&[provider]).set(subtotal);
            inner
                .cost_monthly_projection
                .with_label_values(&[provider])
                .set(subtotal * MONTHLY_PROJECTION_FACTOR);
        }

        for attempt in &outcome.attempts {
            inner
                .fetch_total
                .with_label_values(&[attempt.provider.as_str(), attempt.status()])
                .inc();
            inner
                .fetch_duration_seconds
                .with_label_values(&[attempt.provider.as_str()])
                .observe(attempt.duration.as_secs_f64());
        }

        for alert in &outcome.alerts {
            inner
                .alerts_total
                .with_label_values(&[alert.kind.as_str(), ALL_PROVIDERS_LABEL])
                .inc();
        }

        inner.cycles_total.inc();
        debug!(
            series = outcome.readings.len(),
            providers = outcome.summary.by_provider.len(),
            "Published cycle metrics"
        );
    }

    /// Encode every registered metric in the Prometheus text format
    pub fn render(&self) -> anyhow::Result<String> {
        let _guard = match self.inner.publish_lock.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.inner.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    /// Number of cycles published so far
    pub fn cycles(&self) -> u64 {
        self.inner.cycles_total.get()
    }
}

/// Structured logger for cost tracker events
///
/// Every record carries an `event` field so log pipelines can filter on it.
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    node_name: String,
}

impl Default for StructuredLogger {
    fn default() -> Self {
        Self::new("local")
    }
}

impl StructuredLogger {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
        }
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    /// Log the outcome of one provider fetch
    pub fn log_fetch_attempt(&self, attempt: &FetchAttempt) {
        if attempt.success {
            info!(
                event = "fetch_attempt",
                node = %self.node_name,
                provider = %attempt.provider,
                status = attempt.status(),
                readings = attempt.reading_count,
                elapsed_ms = attempt.duration.as_millis() as u64,
                "Provider fetch complete"
            );
        } else {
            warn!(
                event = "fetch_attempt",
                node = %self.node_name,
                provider = %attempt.provider,
                status = attempt.status(),
                error = attempt.error.as_deref().unwrap_or("unknown"),
                elapsed_ms = attempt.duration.as_millis() as u64,
                "Provider fetch failed"
            );
        }
    }

    /// Log a triggered alert
    pub fn log_alert(&self, alert: &TriggeredAlert) {
        warn!(
            event = "alert_triggered",
            node = %self.node_name,
            rule = %alert.rule_name,
            alert_type = %alert.kind,
            period = %alert.period,
            actual = alert.actual,
            threshold = alert.threshold,
            channels = ?alert.channels,
            "Cost alert triggered"
        );
    }

    /// Log a delivery that did not succeed
    pub fn log_delivery(&self, outcome: &DeliveryOutcome) {
        match &outcome.status {
            DeliveryStatus::Delivered => {}
            DeliveryStatus::Skipped(reason) => {
                debug!(
                    event = "notification_skipped",
                    node = %self.node_name,
                    rule = %outcome.rule_name,
                    channel = %outcome.channel,
                    reason = %reason,
                    "Notification skipped"
                );
            }
            DeliveryStatus::Failed(reason) => {
                warn!(
                    event = "notification_failed",
                    node = %self.node_name,
                    rule = %outcome.rule_name,
                    channel = %outcome.channel,
                    error = %reason,
                    "Notification delivery failed"
                );
            }
        }
    }

    /// Log the end of a collection cycle
    pub fn log_cycle_complete(
        &self,
        summary: &Summary,
        readings: usize,
        alerts: usize,
        elapsed: Duration,
    ) {
        info!(
            event = "cycle_complete",
            node = %self.node_name,
            total_cost = summary.total_amount,
            providers = summary.by_provider.len(),
            services = summary.by_service.len(),
            readings = readings,
            alerts = alerts,
            elapsed_ms = elapsed.as_millis() as u64,
            generated_at = %summary.generated_at.to_rfc3339(),
            "Collection cycle complete"
        );
    }

    /// Log exporter startup
    pub fn log_startup(&self, version: &str, port: u16, interval: Duration) {
        info!(
            event = "exporter_started",
            node = %self.node_name,
            exporter_version = %version,
            port = port,
            interval_secs = interval.as_secs(),
            "Cost exporter started"
        );
    }

    /// Log exporter shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "exporter_shutdown",
            node = %self.node_name,
            reason = %reason,
            "Cost exporter shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate;
    use crate::models::Reading;
    use chrono::Utc;

    fn outcome(readings: Vec<Reading>, alerts: Vec<TriggeredAlert>) -> CycleOutcome {
        let summary = aggregate(&readings);
        CycleOutcome {
            attempts: vec![FetchAttempt {
                provider: "aws".to_string(),
                success: true,
                duration: Duration::from_millis(120),
                reading_count: readings.len(),
                error: None,
            }],
            readings,
            summary,
            alerts,
            deliveries: Vec::new(),
        }
    }

    fn alert() -> TriggeredAlert {
        TriggeredAlert {
            rule_name: "daily_threshold_1".to_string(),
            kind: "threshold".to_string(),
            threshold: 100.0,
            actual: 150.5,
            period: "daily".to_string(),
            channels: Vec::new(),
            scoped_services: Vec::new(),
            triggered_at: Utc::now(),
        }
    }

    #[test]
    fn test_publish_and_render() {
        let metrics = CostMetrics::new().unwrap();
        metrics.publish(&outcome(
            vec![
                Reading::new("ec2", "aws", 150.5).with_region("us-east-1"),
                Reading::new("s3", "aws", 10.0),
            ],
            vec![alert()],
        ));

        let text = metrics.render().unwrap();

        assert!(text.contains(
            r#"cloud_cost_total{provider="aws",region="us-east-1",service="ec2"} 150.5"#
        ));
        assert!(
            text.contains(r#"cloud_cost_total{provider="aws",region="unknown",service="s3"} 10"#)
        );
        assert!(text.contains(r#"cloud_cost_daily{provider="aws"} 160.5"#));
        assert!(text.contains(r#"cloud_cost_monthly_projection{provider="aws"} 4815"#));
        assert!(text.contains(r#"cost_fetch_total{provider="aws",status="success"} 1"#));
        assert!(text.contains(r#"cost_alerts_total{alert_type="threshold",provider="all"} 1"#));
        assert!(text.contains("cost_fetch_duration_seconds_bucket"));
        assert!(text.contains("cost_exporter_cycles_total 1"));
    }

    #[test]
    fn test_stale_series_removed() {
        let metrics = CostMetrics::new().unwrap();
        metrics.publish(&outcome(vec![Reading::new("ec2", "aws", 5.0)], Vec::new()));
        metrics.publish(&outcome(vec![Reading::new("lambda", "aws", 1.0)], Vec::new()));

        let text = metrics.render().unwrap();
        assert!(!text.contains(r#"service="ec2""#));
        assert!(text.contains(r#"service="lambda""#));
        assert!(text.contains(r#"cost_fetch_total{provider="aws",status="success"} 2"#));
        assert_eq!(metrics.cycles(), 2);
    }

    #[test]
    fn test_duplicate_series_summed() {
        let metrics = CostMetrics::new().unwrap();
        metrics.publish(&outcome(
            vec![
                Reading::new("ec2", "aws", 1.5).with_resource_id("i-1"),
                Reading::new("ec2", "aws", 2.0).with_resource_id("i-2"),
            ],
            Vec::new(),
        ));

        let text = metrics.render().unwrap();
        assert!(
            text.contains(r#"cloud_cost_total{provider="aws",region="unknown",service="ec2"} 3.5"#)
        );
    }

    #[test]
    fn test_independent_registries() {
        // Separate instances must not collide on registration
        let first = CostMetrics::new().unwrap();
        let second = CostMetrics::new().unwrap();
        first.publish(&outcome(Vec::new(), Vec::new()));

        assert_eq!(first.cycles(), 1);
        assert_eq!(second.cycles(), 0);
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("test-node");
        assert_eq!(logger.node_name(), "test-node");
        assert_eq!(StructuredLogger::default().node_name(), "local");
    }
}
