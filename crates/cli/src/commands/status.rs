//! Service health and model information commands

use anyhow::Result;
use colored::Colorize;

use crate::client::ApiClient;
use crate::output::{
    color_status, format_timestamp, print_info, print_json, print_success, print_warning,
    OutputFormat,
};

/// Show service health
pub async fn show_health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health = client.health().await?;

    match format {
        OutputFormat::Json => print_json(&health)?,
        OutputFormat::Table => {
            println!("{}", health.service.bold());
            println!("{}", "=".repeat(40));
            println!("Status:        {}", color_status(&health.status));
            println!(
                "Model version: {}",
                health.model_version.as_deref().unwrap_or("-").cyan()
            );
            if let Some(backend) = &health.backend {
                println!("Backend:       {}", backend);
            }
            println!("Checked at:    {}", format_timestamp(&health.timestamp));
            println!();

            if health.models_loaded {
                print_success("Trained models loaded");
            } else {
                print_warning("Models not loaded, predictions come from the heuristic fallback");
            }
        }
    }

    Ok(())
}

/// Show metadata of the models serving predictions
pub async fn show_model_info(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let info = client.model_info().await?;

    match format {
        OutputFormat::Json => print_json(&info)?,
        OutputFormat::Table => {
            let meta = &info.metadata;
            println!("{}", "Model Information".bold());
            println!("{}", "=".repeat(40));
            println!("Version:    {}", meta.version.cyan());
            if let Some(backend) = &info.backend {
                println!("Backend:    {}", backend);
            }
            if let Some(trained_at) = &meta.trained_at {
                println!("Trained at: {}", format_timestamp(trained_at));
            }
            if !meta.season_classes.is_empty() {
                println!("Seasons:    {}", meta.season_classes.join(", "));
            }
            println!();

            print_info(&format!("{} delay features:", meta.feature_cols.len()));
            for (idx, col) in meta.feature_cols.iter().enumerate() {
                println!("  {:>2}. {}", idx, col);
            }
        }
    }

    Ok(())
}
