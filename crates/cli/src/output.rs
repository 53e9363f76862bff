//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print any response as pretty JSON
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format a probability in [0, 1] as a percentage
pub fn format_probability(probability: f64) -> String {
    format!("{:.1}%", probability * 100.0)
}

/// Format a delay estimate, `-` when there is none
pub fn format_hours(hours: f64) -> String {
    if hours > 0.0 {
        format!("{:.1}h", hours)
    } else {
        "-".to_string()
    }
}

/// Format a yes/no flag
pub fn format_flag(flag: bool) -> String {
    if flag {
        "yes".red().to_string()
    } else {
        "no".green().to_string()
    }
}

/// Color a risk level
pub fn color_risk(level: &str) -> String {
    match level.to_lowercase().as_str() {
        "low" => level.green().to_string(),
        "medium" => level.yellow().to_string(),
        "high" => level.red().bold().to_string(),
        _ => level.to_string(),
    }
}

/// Color a composite risk score using the 40/70 bands
pub fn color_score(score: f64) -> String {
    let formatted = format!("{:.1}", score);
    if score >= 70.0 {
        formatted.red().to_string()
    } else if score >= 40.0 {
        formatted.yellow().to_string()
    } else {
        formatted.green().to_string()
    }
}

/// Color status based on value
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "ok" | "healthy" => status.green().to_string(),
        "degraded" | "warning" => status.yellow().to_string(),
        "unhealthy" | "error" | "failed" => status.red().to_string(),
        _ => status.to_string(),
    }
}

/// Render an RFC 3339 timestamp in local time, or return it unchanged
pub fn format_timestamp(ts: &str) -> String {
    chrono::DateTime::parse_from_rfc3339(ts)
        .map(|dt| {
            dt.with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|_| ts.to_string())
}
