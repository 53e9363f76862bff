//! Feature vectorization for ML inference
//!
//! Maps a sparse [`ShipmentInput`] onto the fixed-order vectors the models
//! were fit against. Each vector carries the schema it was built for, and
//! the registry's declared order is checked before any vector leaves this
//! module: a silent mismatch would still produce plausible-looking
//! predictions.

use super::registry::ModelRegistry;
use super::temporal::TemporalContext;
use crate::error::{InsightsError, Result};
use crate::models::ShipmentInput;
use std::fmt;

/// Values applied for fields missing from the input
pub mod defaults {
    pub const DISTANCE_KM: f64 = 500.0;
    pub const TEMPERATURE_AVG: f64 = 20.0;
    pub const TEMPERATURE_VARIANCE: f64 = 5.0;
    pub const CARRIER_RATING: f64 = 4.0;
    pub const PACKAGE_WEIGHT: f64 = 10.0;
    pub const ROUTE_COMPLEXITY: i64 = 3;
    pub const WEATHER_SCORE: f64 = 7.0;
    pub const IS_FRAGILE: bool = false;
    pub const IS_EXPRESS: bool = false;
}

/// Named, versioned feature layout
#[derive(Debug, PartialEq, Eq)]
pub struct FeatureSchema {
    pub name: &'static str,
    pub version: u32,
    pub fields: &'static [&'static str],
}

impl FeatureSchema {
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.to_string()).collect()
    }

    pub fn index_of(&self, field: &str) -> Option<usize> {
        self.fields.iter().position(|f| *f == field)
    }

    /// Check a declared feature order against this schema
    ///
    /// Length, membership and position must all agree.
    pub fn check_declared(&self, declared: &[String]) -> Result<()> {
        if let Some(missing) = self.fields.iter().find(|f| !declared.iter().any(|d| d == *f)) {
            return Err(InsightsError::schema(
                self.to_string(),
                format!("registry does not declare feature `{}`", missing),
            ));
        }
        if let Some(extra) = declared.iter().find(|d| self.index_of(d).is_none()) {
            return Err(InsightsError::schema(
                self.to_string(),
                format!("registry declares unknown feature `{}`", extra),
            ));
        }
        if declared.len() != self.len() {
            return Err(InsightsError::schema(
                self.to_string(),
                format!(
                    "registry declares {} features, vectorizer builds {}",
                    declared.len(),
                    self.len()
                ),
            ));
        }
        for (idx, (expected, actual)) in self.fields.iter().zip(declared).enumerate() {
            if expected != actual {
                return Err(InsightsError::schema(
                    self.to_string(),
                    format!(
                        "position {}: registry expects `{}`, vectorizer builds `{}`",
                        idx, actual, expected
                    ),
                ));
            }
        }
        Ok(())
    }
}

impl fmt::Display for FeatureSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/v{}", self.name, self.version)
    }
}

/// Delay classifier and regressor input layout
pub static DELAY_SCHEMA: FeatureSchema = FeatureSchema {
    name: "delay",
    version: 1,
    fields: &[
        "distance_km",
        "temperature_avg",
        "temperature_variance",
        "carrier_rating",
        "package_weight",
        "route_complexity",
        "weather_score",
        "day_of_week",
        "is_fragile",
        "is_express",
        "season_encoded",
    ],
};

/// Anomaly classifier input layout
pub static ANOMALY_SCHEMA: FeatureSchema = FeatureSchema {
    name: "anomaly",
    version: 1,
    fields: &[
        "temperature_avg",
        "temperature_variance",
        "distance_km",
        "route_complexity",
        "weather_score",
    ],
};

/// Model input tagged with its schema
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    schema: &'static FeatureSchema,
    values: Vec<f32>,
}

impl FeatureVector {
    /// Build a vector from named values, which must follow the schema order
    pub fn from_named(schema: &'static FeatureSchema, named: &[(&str, f32)]) -> Result<Self> {
        let names: Vec<String> = named.iter().map(|(n, _)| n.to_string()).collect();
        schema.check_declared(&names)?;
        Ok(Self {
            schema,
            values: named.iter().map(|(_, v)| *v).collect(),
        })
    }

    pub fn schema(&self) -> &'static FeatureSchema {
        self.schema
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<f32> {
        self.schema.index_of(field).map(|idx| self.values[idx])
    }

    /// Fail unless the vector was built for `expected`
    pub fn ensure_schema(&self, expected: &FeatureSchema) -> Result<()> {
        if self.schema != expected {
            return Err(InsightsError::schema(
                expected.to_string(),
                format!("received a {} vector", self.schema),
            ));
        }
        Ok(())
    }
}

fn flag(value: bool) -> f32 {
    if value {
        1.0
    } else {
        0.0
    }
}

/// Builds delay and anomaly vectors from shipment inputs
#[derive(Debug, Clone, Default)]
pub struct FeatureVectorizer {
    temporal: TemporalContext,
}

impl FeatureVectorizer {
    pub fn new(temporal: TemporalContext) -> Self {
        Self { temporal }
    }

    pub fn temporal(&self) -> &TemporalContext {
        &self.temporal
    }

    /// Check both schemas against what the registry declares
    pub fn validate(&self, registry: &dyn ModelRegistry) -> Result<()> {
        DELAY_SCHEMA.check_declared(registry.declared_feature_order())?;
        if let Some(order) = registry.declared_anomaly_feature_order() {
            ANOMALY_SCHEMA.check_declared(order)?;
        }
        Ok(())
    }

    pub fn vectorize_for_delay(
        &self,
        input: &ShipmentInput,
        registry: &dyn ModelRegistry,
    ) -> Result<FeatureVector> {
        DELAY_SCHEMA.check_declared(registry.declared_feature_order())?;

        let (season, weekday) = self.temporal.snapshot();
        let season_encoded = registry.encode_season(season.as_str())?;

        FeatureVector::from_named(
            &DELAY_SCHEMA,
            &[
                ("distance_km", distance(input)?),
                ("temperature_avg", temperature_avg(input)?),
                ("temperature_variance", temperature_variance(input)?),
                (
                    "carrier_rating",
                    to_feature(
                        "carrier_rating",
                        input.carrier_rating.unwrap_or(defaults::CARRIER_RATING),
                    )?,
                ),
                (
                    "package_weight",
                    to_feature(
                        "package_weight",
                        input.package_weight.unwrap_or(defaults::PACKAGE_WEIGHT),
                    )?,
                ),
                ("route_complexity", route_complexity(input)),
                ("weather_score", weather_score(input)?),
                ("day_of_week", weekday as f32),
                (
                    "is_fragile",
                    flag(input.is_fragile.unwrap_or(defaults::IS_FRAGILE)),
                ),
                (
                    "is_express",
                    flag(input.is_express.unwrap_or(defaults::IS_EXPRESS)),
                ),
                ("season_encoded", season_encoded as f32),
            ],
        )
    }

    pub fn vectorize_for_anomaly(
        &self,
        input: &ShipmentInput,
        registry: &dyn ModelRegistry,
    ) -> Result<FeatureVector> {
        if let Some(order) = registry.declared_anomaly_feature_order() {
            ANOMALY_SCHEMA.check_declared(order)?;
        }

        FeatureVector::from_named(
            &ANOMALY_SCHEMA,
            &[
                ("temperature_avg", temperature_avg(input)?),
                ("temperature_variance", temperature_variance(input)?),
                ("distance_km", distance(input)?),
                ("route_complexity", route_complexity(input)),
                ("weather_score", weather_score(input)?),
            ],
        )
    }
}

/// Narrow to the models' f32 input, rejecting values that overflow it
fn to_feature(field: &str, value: f64) -> Result<f32> {
    let narrowed = value as f32;
    if !narrowed.is_finite() {
        return Err(InsightsError::input_validation(
            field,
            "number within f32 range",
            format!("number {}", value),
        ));
    }
    Ok(narrowed)
}

fn distance(input: &ShipmentInput) -> Result<f32> {
    to_feature(
        "distance_km",
        input.distance_km.unwrap_or(defaults::DISTANCE_KM),
    )
}

fn temperature_avg(input: &ShipmentInput) -> Result<f32> {
    to_feature(
        "temperature_avg",
        input.temperature_avg.unwrap_or(defaults::TEMPERATURE_AVG),
    )
}

fn temperature_variance(input: &ShipmentInput) -> Result<f32> {
    to_feature(
        "temperature_variance",
        input
            .temperature_variance
            .unwrap_or(defaults::TEMPERATURE_VARIANCE),
    )
}

fn route_complexity(input: &ShipmentInput) -> f32 {
    input.route_complexity.unwrap_or(defaults::ROUTE_COMPLEXITY) as f32
}

fn weather_score(input: &ShipmentInput) -> Result<f32> {
    to_feature(
        "weather_score",
        input.weather_score.unwrap_or(defaults::WEATHER_SCORE),
    )
}
