//! Core data models for shipment scoring

use crate::error::{InsightsError, Result};
use crate::predictor::RiskLevel;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Shipment identifier reported when the input carries none
pub const UNKNOWN_SHIPMENT_ID: &str = "unknown";

/// Raw shipment attributes as received from a caller
///
/// Every field is optional. Missing values are filled in by the feature
/// vectorizer, so a record is only rejected when a supplied field has the
/// wrong type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value")]
pub struct ShipmentInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature_avg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature_variance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carrier_rating: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_weight: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route_complexity: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weather_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_fragile: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_express: Option<bool>,
}

impl ShipmentInput {
    /// Parse a shipment from a JSON object, checking field types
    pub fn from_value(value: &Value) -> Result<Self> {
        let map = value
            .as_object()
            .ok_or_else(|| InsightsError::input_validation("shipment", "object", describe(value)))?;

        Ok(Self {
            shipment_id: string_field(map, "shipment_id")?,
            distance_km: number_field(map, "distance_km")?,
            temperature_avg: number_field(map, "temperature_avg")?,
            temperature_variance: number_field(map, "temperature_variance")?,
            carrier_rating: number_field(map, "carrier_rating")?,
            package_weight: number_field(map, "package_weight")?,
            route_complexity: integer_field(map, "route_complexity")?,
            weather_score: number_field(map, "weather_score")?,
            is_fragile: flag_field(map, "is_fragile")?,
            is_express: flag_field(map, "is_express")?,
        })
    }

    /// Parse a JSON array of shipments. Field errors are reported with the
    /// element index, e.g. `shipments[2].distance_km`.
    pub fn list_from_value(value: &Value) -> Result<Vec<Self>> {
        let items = value
            .as_array()
            .ok_or_else(|| InsightsError::input_validation("shipments", "array", describe(value)))?;

        items
            .iter()
            .enumerate()
            .map(|(idx, item)| {
                Self::from_value(item).map_err(|e| match e {
                    InsightsError::InputValidation {
                        field,
                        expected,
                        found,
                    } => {
                        let field = if field == "shipment" {
                            format!("shipments[{}]", idx)
                        } else {
                            format!("shipments[{}].{}", idx, field)
                        };
                        InsightsError::InputValidation {
                            field,
                            expected,
                            found,
                        }
                    }
                    other => other,
                })
            })
            .collect()
    }

    /// Identifier used in results
    pub fn id_or_unknown(&self) -> &str {
        self.shipment_id.as_deref().unwrap_or(UNKNOWN_SHIPMENT_ID)
    }
}

impl TryFrom<Value> for ShipmentInput {
    type Error = InsightsError;

    fn try_from(value: Value) -> Result<Self> {
        Self::from_value(&value)
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => format!("boolean {}", b),
        Value::Number(n) => format!("number {}", n),
        Value::String(s) => format!("string {:?}", s),
        Value::Array(_) => "array".to_string(),
        Value::Object(_) => "object".to_string(),
    }
}

// `null` is treated the same as an absent key.
fn present<'a>(map: &'a Map<String, Value>, field: &str) -> Option<&'a Value> {
    map.get(field).filter(|v| !v.is_null())
}

fn number_field(map: &Map<String, Value>, field: &str) -> Result<Option<f64>> {
    match present(map, field) {
        None => Ok(None),
        Some(Value::Number(n)) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| InsightsError::input_validation(field, "number", n.to_string())),
        Some(other) => Err(InsightsError::input_validation(field, "number", describe(other))),
    }
}

fn integer_field(map: &Map<String, Value>, field: &str) -> Result<Option<i64>> {
    match present(map, field) {
        None => Ok(None),
        Some(Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                return Ok(Some(i));
            }
            match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(Some(f as i64)),
                _ => Err(InsightsError::input_validation(
                    field,
                    "integer",
                    format!("number {}", n),
                )),
            }
        }
        Some(other) => Err(InsightsError::input_validation(field, "integer", describe(other))),
    }
}

fn flag_field(map: &Map<String, Value>, field: &str) -> Result<Option<bool>> {
    match present(map, field) {
        None => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(0) => Ok(Some(false)),
            Some(1) => Ok(Some(true)),
            _ => Err(InsightsError::input_validation(
                field,
                "boolean or 0/1",
                format!("number {}", n),
            )),
        },
        Some(other) => Err(InsightsError::input_validation(
            field,
            "boolean or 0/1",
            describe(other),
        )),
    }
}

fn string_field(map: &Map<String, Value>, field: &str) -> Result<Option<String>> {
    match present(map, field) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(InsightsError::input_validation(field, "string", describe(other))),
    }
}

/// Full scoring outcome for one shipment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub shipment_id: String,
    pub delay_probability: f64,
    pub is_delayed: bool,
    /// Zero unless `is_delayed`
    pub estimated_delay_hours: f64,
    pub anomaly_probability: f64,
    pub has_anomaly: bool,
    /// Composite score in [0, 100]
    pub risk_score: f64,
    pub risk_level: RiskLevel,
}

/// Answer of the delay capability alone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelayPrediction {
    pub is_delayed: bool,
    pub delay_probability: f64,
    pub estimated_delay_hours: f64,
    pub risk_level: RiskLevel,
}

/// Answer of the anomaly capability alone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyPrediction {
    pub has_anomaly: bool,
    pub anomaly_probability: f64,
    pub risk_level: RiskLevel,
}

/// Composite-score histogram over a batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskDistribution {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
}

impl RiskDistribution {
    pub fn record(&mut self, level: RiskLevel) {
        match level {
            RiskLevel::Low => self.low += 1,
            RiskLevel::Medium => self.medium += 1,
            RiskLevel::High => self.high += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.low + self.medium + self.high
    }
}

/// One bucket of the delayed/on-time trend series
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub week: String,
    pub delayed: usize,
    pub on_time: usize,
}

impl TrendPoint {
    pub fn new(week: impl Into<String>, delayed: usize, on_time: usize) -> Self {
        Self {
            week: week.into(),
            delayed,
            on_time,
        }
    }
}

/// Fleet-level summary of a scored batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InsightsSummary {
    pub total_shipments: usize,
    pub delayed_shipments: usize,
    /// Rounded to two decimals
    pub delay_percentage: f64,
    /// Mean over delayed shipments only, rounded to two decimals
    pub average_delay_hours: f64,
    pub high_risk_shipments: usize,
    pub anomalies_detected: usize,
    pub risk_distribution: RiskDistribution,
    pub trends: Vec<TrendPoint>,
    /// First results in input order
    pub predictions: Vec<PredictionResult>,
}
