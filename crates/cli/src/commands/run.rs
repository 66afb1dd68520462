//! Single-shot collection cycle

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use std::path::Path;
use tabled::Tabled;
use tracing::debug;
use tracker_lib::alerting::{DeliveryOutcome, DeliveryStatus};
use tracker_lib::{CostTracker, CycleOutcome, Summary, TrackerConfig};

use crate::output::{
    color_status, display_currency, format_currency, format_share, print_info, print_json,
    print_success, print_table, print_warning, OutputFormat,
};

/// How many services the table view lists
const TOP_SERVICES: usize = 10;

#[derive(Tabled)]
struct ProviderRow {
    #[tabled(rename = "Provider")]
    provider: String,
    #[tabled(rename = "Cost")]
    cost: String,
    #[tabled(rename = "Share")]
    share: String,
}

#[derive(Tabled)]
struct ServiceRow {
    #[tabled(rename = "Service")]
    service: String,
    #[tabled(rename = "Cost")]
    cost: String,
}

#[derive(Tabled)]
struct DeliveryRow {
    #[tabled(rename = "Rule")]
    rule: String,
    #[tabled(rename = "Channel")]
    channel: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

impl From<&DeliveryOutcome> for DeliveryRow {
    fn from(outcome: &DeliveryOutcome) -> Self {
        let (status, detail) = match &outcome.status {
            DeliveryStatus::Delivered => ("delivered", String::new()),
            DeliveryStatus::Skipped(reason) => ("skipped", reason.clone()),
            DeliveryStatus::Failed(reason) => ("failed", reason.clone()),
        };
        Self {
            rule: outcome.rule_name.clone(),
            channel: outcome.channel.clone(),
            status: color_status(status),
            detail,
        }
    }
}

/// JSON view of a run
#[derive(Serialize)]
struct RunOutput<'a> {
    #[serde(flatten)]
    summary: &'a Summary,
    alerts: &'a [tracker_lib::TriggeredAlert],
}

/// Run one cycle, print the summary, and optionally persist a report
pub async fn run(
    config_path: Option<&Path>,
    output: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    let config = TrackerConfig::load(config_path)?;
    let tracker = CostTracker::from_config(&config)?;

    debug!(
        providers = tracker.providers().len(),
        rules = tracker.rules().len(),
        "Starting collection cycle"
    );
    let outcome = tracker.run_cycle().await;

    match format {
        OutputFormat::Json => print_json(&RunOutput {
            summary: &outcome.summary,
            alerts: &outcome.alerts,
        })?,
        OutputFormat::Table => print_outcome(&tracker, &outcome),
    }

    if let Some(path) = output {
        tracker
            .save_report(&outcome.summary, path)
            .with_context(|| format!("Failed to save report to {}", path.display()))?;

        if matches!(format, OutputFormat::Table) {
            print_success(&format!("Report saved to {}", path.display()));
        }
    }

    Ok(())
}

fn print_outcome(tracker: &CostTracker, outcome: &CycleOutcome) {
    if tracker.providers().is_empty() {
        print_info("No providers enabled; nothing was collected");
    }

    for attempt in outcome.attempts.iter().filter(|a| !a.success) {
        print_warning(&format!(
            "Provider {} failed: {}",
            attempt.provider,
            attempt.error.as_deref().unwrap_or("unknown error")
        ));
    }

    let summary = &outcome.summary;
    let currency = display_currency(&outcome.readings);

    println!("{}", "Cost Summary".bold());
    println!("{}", "=".repeat(50));

    let providers: Vec<ProviderRow> = summary
        .by_provider
        .iter()
        .map(|(provider, cost)| ProviderRow {
            provider: provider.to_string(),
            cost: format_currency(cost, currency),
            share: format_share(cost, summary.total_amount),
        })
        .collect();
    print_table(&providers, "No costs reported");
    println!();

    if !summary.by_service.is_empty() {
        println!("{}", "Top Services".bold());
        let services: Vec<ServiceRow> = summary
            .by_service
            .iter()
            .take(TOP_SERVICES)
            .map(|(service, cost)| ServiceRow {
                service: service.to_string(),
                cost: format_currency(cost, currency),
            })
            .collect();
        print_table(&services, "No services");
        println!();
    }

    println!(
        "{} {}",
        "Total:".bold(),
        format_currency(summary.total_amount, currency).cyan().bold()
    );

    if outcome.alerts.is_empty() {
        return;
    }

    println!();
    println!("{}", "Alerts".bold());
    for alert in &outcome.alerts {
        print_warning(&format!(
            "{}: {} exceeds {} ({})",
            alert.rule_name,
            format_currency(alert.actual, currency),
            format_currency(alert.threshold, currency),
            alert.period
        ));
    }

    if !outcome.deliveries.is_empty() {
        let rows: Vec<DeliveryRow> = outcome.deliveries.iter().map(DeliveryRow::from).collect();
        print_table(&rows, "No deliveries");
    }
}
