//! Threshold rule evaluation

use crate::models::{AlertRule, Summary, TriggeredAlert};
use chrono::Utc;
use tracing::{debug, warn};

/// Evaluates a fixed set of rules against each cycle's summary
#[derive(Debug, Clone, Default)]
pub struct AlertEvaluator {
    rules: Vec<AlertRule>,
}

impl AlertEvaluator {
    pub fn new(rules: Vec<AlertRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[AlertRule] {
        &self.rules
    }

    pub fn evaluate(&self, summary: &Summary) -> Vec<TriggeredAlert> {
        evaluate(summary, &self.rules)
    }
}

/// Compare the summary total against every rule, in declaration order.
///
/// A rule triggers only when the total strictly exceeds its threshold. Scoped services
/// are carried onto the alert but the comparison always uses the grand total.
pub fn evaluate(summary: &Summary, rules: &[AlertRule]) -> Vec<TriggeredAlert> {
    let total = summary.total_amount;
    let mut alerts = Vec::new();

    for rule in rules {
        if total <= rule.threshold {
            debug!(rule = %rule.name, total, threshold = rule.threshold, "Rule not triggered");
            continue;
        }

        if !rule.scoped_services.is_empty() {
            debug!(
                rule = %rule.name,
                services = ?rule.scoped_services,
                "Rule lists services; comparing against the grand total"
            );
        }

        warn!(
            rule = %rule.name,
            total,
            threshold = rule.threshold,
            period = %rule.period,
            "Cost threshold exceeded"
        );

        alerts.push(TriggeredAlert {
            rule_name: rule.name.clone(),
            kind: rule.kind.clone(),
            threshold: rule.threshold,
            actual: total,
            period: rule.period.clone(),
            channels: rule.channels.clone(),
            scoped_services: rule.scoped_services.clone(),
            triggered_at: Utc::now(),
        });
    }

    alerts
}
