//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};
use tracker_lib::{Reading, DEFAULT_CURRENCY};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a table, or a note when there is nothing to show
pub fn print_table<T: Tabled>(items: &[T], empty_message: &str) {
    if items.is_empty() {
        println!("{}", empty_message.yellow());
        return;
    }
    let table = Table::new(items).with(Style::rounded()).to_string();
    println!("{}", table);
}

/// Print any serializable value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format currency
pub fn format_currency(amount: f64, currency: &str) -> String {
    match currency {
        "USD" => format!("${:.2}", amount),
        "EUR" => format!("€{:.2}", amount),
        "GBP" => format!("£{:.2}", amount),
        _ => format!("{:.2} {}", amount, currency),
    }
}

/// Currency shared by every reading, falling back to the default
pub fn display_currency(readings: &[Reading]) -> &str {
    match readings.first() {
        Some(first) if readings.iter().all(|r| r.currency == first.currency) => &first.currency,
        _ => DEFAULT_CURRENCY,
    }
}

/// Share of a total as a percentage string
pub fn format_share(part: f64, total: f64) -> String {
    if total > 0.0 {
        format!("{:.1}%", part / total * 100.0)
    } else {
        "-".to_string()
    }
}

/// Color a status word
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "delivered" | "success" | "healthy" => status.green().to_string(),
        "skipped" | "degraded" => status.yellow().to_string(),
        "failed" | "failure" | "unhealthy" => status.red().to_string(),
        _ => status.to_string(),
    }
}
