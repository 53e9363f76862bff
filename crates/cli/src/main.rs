//! ChainSight CLI
//!
//! A command-line tool for querying the ChainSight ML service: service
//! health, single-shipment predictions and batch insights.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{insights, predict, status};
use std::path::PathBuf;

/// ChainSight shipment insights CLI
#[derive(Parser)]
#[command(name = "chainsight")]
#[command(author, version, about = "CLI for the ChainSight shipment insights service", long_about = None)]
pub struct Cli {
    /// ML service URL [default: http://localhost:5000]
    #[arg(long, env = "CHAINSIGHT_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check service health
    Health,

    /// Full risk assessment for one shipment
    Predict {
        /// JSON file with one shipment object (`-` for stdin)
        file: PathBuf,
    },

    /// Predict whether a shipment will be delayed
    Delay {
        /// JSON file with one shipment object (`-` for stdin)
        file: PathBuf,
    },

    /// Predict cargo condition anomalies for a shipment
    Anomaly {
        /// JSON file with one shipment object (`-` for stdin)
        file: PathBuf,
    },

    /// Aggregate insights for a batch of shipments
    Insights {
        /// JSON file with an array of shipments or `{"shipments": [...]}`
        file: PathBuf,
    },

    /// Show metadata of the loaded models
    ModelInfo,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        output::print_error(&format!("{:#}", e));
        if let Some(api_err) = e.downcast_ref::<client::ApiError>() {
            if api_err.kind.as_deref() == Some("input_validation_error") {
                output::print_info("Check the field types in the shipment file");
            }
        }
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let config = config::Config::load()?;
    let api_url = config.resolve_api_url(cli.api_url.as_deref());
    let client = client::ApiClient::new(&api_url)?;

    match cli.command {
        Commands::Health => status::show_health(&client, cli.format).await?,
        Commands::Predict { file } => predict::predict(&client, &file, cli.format).await?,
        Commands::Delay { file } => predict::predict_delay(&client, &file, cli.format).await?,
        Commands::Anomaly { file } => predict::predict_anomaly(&client, &file, cli.format).await?,
        Commands::Insights { file } => insights::show_insights(&client, &file, cli.format).await?,
        Commands::ModelInfo => status::show_model_info(&client, cli.format).await?,
    }

    Ok(())
}
