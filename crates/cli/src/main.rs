//! Multi-cloud cost tracker CLI
//!
//! Runs a single collection cycle against the configured providers,
//! prints the cost summary and optionally writes a JSON report.

mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{run, validate};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Multi-cloud cost tracker
#[derive(Parser)]
#[command(name = "cost-tracker")]
#[command(author, version, about = "Multi-cloud cost tracker", long_about = None)]
pub struct Cli {
    /// Path to the YAML configuration (defaults to ~/.cost_tracker.yaml)
    #[arg(long, short, global = true, env = "COST_TRACKER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short, global = true, default_value = "table")]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Collect costs once, evaluate alerts and print the summary
    Run {
        /// Write a JSON report to this path
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Check the configuration without contacting any provider
    Validate,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

async fn execute(cli: Cli) -> Result<()> {
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Run { output } => {
            run::run(config, output.as_deref(), cli.format).await?;
        }
        Commands::Validate => {
            validate::validate(config, cli.format)?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = execute(cli).await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}
