//! Single-shipment prediction commands

use anyhow::Result;
use colored::Colorize;
use serde_json::Value;
use std::path::Path;
use tabled::{settings::Style, Table, Tabled};

use super::read_json_input;
use crate::client::ApiClient;
use crate::output::{
    color_risk, color_score, format_flag, format_hours, format_probability, print_json,
    OutputFormat,
};

/// One labelled line of a prediction report
#[derive(Tabled)]
struct FieldRow {
    #[tabled(rename = "Field")]
    field: String,
    #[tabled(rename = "Value")]
    value: String,
}

fn row(field: &str, value: String) -> FieldRow {
    FieldRow {
        field: field.to_string(),
        value,
    }
}

fn print_rows(title: &str, rows: Vec<FieldRow>) {
    println!("{}", title.bold());
    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
}

fn load_shipment(path: &Path) -> Result<Value> {
    let value = read_json_input(path)?;
    if !value.is_object() {
        anyhow::bail!("{} must contain a single shipment object", path.display());
    }
    Ok(value)
}

/// Full risk assessment for one shipment
pub async fn predict(client: &ApiClient, path: &Path, format: OutputFormat) -> Result<()> {
    let shipment = load_shipment(path)?;
    let result = client.predict(&shipment).await?;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => print_rows(
            &format!("Shipment {}", result.shipment_id),
            vec![
                row("Delayed", format_flag(result.is_delayed)),
                row("Delay probability", format_probability(result.delay_probability)),
                row("Estimated delay", format_hours(result.estimated_delay_hours)),
                row("Anomaly", format_flag(result.has_anomaly)),
                row(
                    "Anomaly probability",
                    format_probability(result.anomaly_probability),
                ),
                row("Risk score", color_score(result.risk_score)),
                row("Risk level", color_risk(&result.risk_level)),
            ],
        ),
    }

    Ok(())
}

/// Delay classification and duration only
pub async fn predict_delay(client: &ApiClient, path: &Path, format: OutputFormat) -> Result<()> {
    let shipment = load_shipment(path)?;
    let prediction = client.predict_delay(&shipment).await?;

    match format {
        OutputFormat::Json => print_json(&prediction)?,
        OutputFormat::Table => print_rows(
            "Delay Prediction",
            vec![
                row("Delayed", format_flag(prediction.is_delayed)),
                row("Probability", format_probability(prediction.delay_probability)),
                row("Estimated delay", format_hours(prediction.estimated_delay_hours)),
                row("Risk level", color_risk(&prediction.risk_level)),
            ],
        ),
    }

    Ok(())
}

/// Cargo condition anomaly only
pub async fn predict_anomaly(client: &ApiClient, path: &Path, format: OutputFormat) -> Result<()> {
    let shipment = load_shipment(path)?;
    let prediction = client.predict_anomaly(&shipment).await?;

    match format {
        OutputFormat::Json => print_json(&prediction)?,
        OutputFormat::Table => print_rows(
            "Anomaly Prediction",
            vec![
                row("Anomaly", format_flag(prediction.has_anomaly)),
                row("Probability", format_probability(prediction.anomaly_probability)),
                row("Risk level", color_risk(&prediction.risk_level)),
            ],
        ),
    }

    Ok(())
}
