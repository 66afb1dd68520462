//! Configuration check

use anyhow::Result;
use serde::Serialize;
use std::path::Path;
use tabled::Tabled;
use tracker_lib::{AlertRule, CostTracker, TrackerConfig};

use crate::output::{format_currency, print_json, print_success, print_table, OutputFormat};

#[derive(Tabled, Serialize)]
struct ProviderRow {
    #[tabled(rename = "Provider")]
    name: String,
    #[tabled(rename = "Kind")]
    kind: String,
}

#[derive(Tabled)]
struct RuleRow {
    #[tabled(rename = "Rule")]
    name: String,
    #[tabled(rename = "Threshold")]
    threshold: String,
    #[tabled(rename = "Period")]
    period: String,
    #[tabled(rename = "Channels")]
    channels: String,
}

impl From<&AlertRule> for RuleRow {
    fn from(rule: &AlertRule) -> Self {
        Self {
            name: rule.name.clone(),
            threshold: format_currency(rule.threshold, "USD"),
            period: rule.period.clone(),
            channels: if rule.channels.is_empty() {
                "-".to_string()
            } else {
                rule.channels.join(", ")
            },
        }
    }
}

#[derive(Serialize)]
struct ValidateOutput<'a> {
    providers: &'a [ProviderRow],
    rules: &'a [AlertRule],
}

/// Load the configuration and build every backend without fetching anything
pub fn validate(config_path: Option<&Path>, format: OutputFormat) -> Result<()> {
    let config = TrackerConfig::load(config_path)?;
    let tracker = CostTracker::from_config(&config)?;

    let providers: Vec<ProviderRow> = config
        .enabled_providers()
        .map(|(name, provider)| ProviderRow {
            name: name.to_string(),
            kind: provider.kind_name(name).to_lowercase(),
        })
        .collect();

    match format {
        OutputFormat::Json => print_json(&ValidateOutput {
            providers: &providers,
            rules: tracker.rules(),
        })?,
        OutputFormat::Table => {
            print_success("Configuration is valid");
            println!();
            print_table(&providers, "No providers enabled");
            println!();
            let rules: Vec<RuleRow> = tracker.rules().iter().map(RuleRow::from).collect();
            print_table(&rules, "No alert rules");
        }
    }

    Ok(())
}
