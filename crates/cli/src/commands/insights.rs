//! Batch insights command

use anyhow::Result;
use colored::Colorize;
use serde_json::Value;
use std::path::Path;
use tabled::{settings::Style, Table, Tabled};

use super::read_json_input;
use crate::client::{ApiClient, InsightsSummary};
use crate::output::{
    color_risk, color_score, format_flag, format_hours, format_probability, print_json,
    print_warning, OutputFormat,
};

/// Row for the per-shipment preview table
#[derive(Tabled)]
struct PreviewRow {
    #[tabled(rename = "Shipment")]
    shipment_id: String,
    #[tabled(rename = "Delay P")]
    delay_probability: String,
    #[tabled(rename = "Delay")]
    delay_hours: String,
    #[tabled(rename = "Anomaly")]
    anomaly: String,
    #[tabled(rename = "Score")]
    score: String,
    #[tabled(rename = "Risk")]
    risk: String,
}

/// Row for the trend table
#[derive(Tabled)]
struct TrendRow {
    #[tabled(rename = "Week")]
    week: String,
    #[tabled(rename = "Delayed")]
    delayed: u64,
    #[tabled(rename = "On time")]
    on_time: u64,
}

/// Accept either a bare array of shipments or `{"shipments": [...]}`
pub fn extract_shipments(document: Value) -> Result<Vec<Value>> {
    match document {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => match map.remove("shipments") {
            Some(Value::Array(items)) => Ok(items),
            Some(_) => anyhow::bail!("`shipments` must be an array"),
            None => anyhow::bail!("expected an array of shipments or an object with `shipments`"),
        },
        _ => anyhow::bail!("expected an array of shipments or an object with `shipments`"),
    }
}

/// Aggregate insights for a batch of shipments
pub async fn show_insights(client: &ApiClient, path: &Path, format: OutputFormat) -> Result<()> {
    let shipments = extract_shipments(read_json_input(path)?)?;
    let summary = client.insights(&shipments).await?;

    match format {
        OutputFormat::Json => print_json(&summary)?,
        OutputFormat::Table => print_summary(&summary),
    }

    Ok(())
}

fn print_summary(summary: &InsightsSummary) {
    println!("{}", "Shipment Insights".bold());
    println!("{}", "=".repeat(60));
    println!("Total shipments:    {}", summary.total_shipments);
    println!(
        "Delayed:            {} ({:.2}%)",
        summary.delayed_shipments, summary.delay_percentage
    );
    println!(
        "Avg delay:          {}",
        format_hours(summary.average_delay_hours)
    );
    println!("High risk:          {}", summary.high_risk_shipments);
    println!("Anomalies:          {}", summary.anomalies_detected);
    println!(
        "Risk distribution:  {} {} / {} {} / {} {}",
        summary.risk_distribution.low,
        color_risk("low"),
        summary.risk_distribution.medium,
        color_risk("medium"),
        summary.risk_distribution.high,
        color_risk("high"),
    );
    println!();

    if summary.total_shipments == 0 {
        print_warning("No shipments in batch");
        return;
    }

    let rows: Vec<PreviewRow> = summary
        .predictions
        .iter()
        .map(|p| PreviewRow {
            shipment_id: p.shipment_id.clone(),
            delay_probability: format_probability(p.delay_probability),
            delay_hours: format_hours(p.estimated_delay_hours),
            anomaly: format_flag(p.has_anomaly),
            score: color_score(p.risk_score),
            risk: color_risk(&p.risk_level),
        })
        .collect();
    println!("{}", Table::new(rows).with(Style::rounded()));

    if summary.total_shipments as usize > summary.predictions.len() {
        println!(
            "Showing first {} of {} shipments",
            summary.predictions.len(),
            summary.total_shipments
        );
    }

    if !summary.trends.is_empty() {
        println!();
        let trends: Vec<TrendRow> = summary
            .trends
            .iter()
            .map(|t| TrendRow {
                week: t.week.clone(),
                delayed: t.delayed,
                on_time: t.on_time,
            })
            .collect();
        println!("{}", Table::new(trends).with(Style::rounded()));
    }
}
