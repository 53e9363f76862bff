//! Error types for the inference and aggregation pipeline

use thiserror::Error;

/// Capability names used in inference errors and logs
pub mod capabilities {
    pub const CLASSIFY_DELAY: &str = "classify_delay";
    pub const REGRESS_DELAY_DURATION: &str = "regress_delay_duration";
    pub const CLASSIFY_ANOMALY: &str = "classify_anomaly";
    pub const ENCODE_SEASON: &str = "encode_season";
}

/// Errors surfaced by the shipment insights core
#[derive(Debug, Error)]
pub enum InsightsError {
    /// Feature order disagreement between the vectorizer and the model registry.
    /// Indicates version skew between deployed models and this build.
    #[error("feature schema mismatch for {schema}: {detail}")]
    Schema { schema: String, detail: String },

    /// A registry capability failed or produced unusable output
    #[error("{capability} failed: {reason}")]
    Inference {
        capability: &'static str,
        reason: String,
    },

    /// A supplied shipment field has the wrong type
    #[error("invalid value for `{field}`: expected {expected}, found {found}")]
    InputValidation {
        field: String,
        expected: &'static str,
        found: String,
    },

    /// Model artifacts could not be read, verified or optimized
    #[error("failed to load model artifacts from {path}: {reason}")]
    ModelLoad { path: String, reason: String },
}

impl InsightsError {
    pub fn schema(schema: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Schema {
            schema: schema.into(),
            detail: detail.into(),
        }
    }

    pub fn inference(capability: &'static str, reason: impl std::fmt::Display) -> Self {
        Self::Inference {
            capability,
            reason: reason.to_string(),
        }
    }

    pub fn input_validation(
        field: impl Into<String>,
        expected: &'static str,
        found: impl Into<String>,
    ) -> Self {
        Self::InputValidation {
            field: field.into(),
            expected,
            found: found.into(),
        }
    }

    pub fn model_load(path: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::ModelLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Stable identifier for logs and metric labels
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Schema { .. } => "schema_error",
            Self::Inference { .. } => "inference_failure",
            Self::InputValidation { .. } => "input_validation_error",
            Self::ModelLoad { .. } => "model_load_error",
        }
    }

    /// True when the caller sent bad data, as opposed to a deployment or model fault
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InputValidation { .. })
    }
}

pub type Result<T> = std::result::Result<T, InsightsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds_are_distinct() {
        let errors = [
            InsightsError::schema("delay/v1", "length differs"),
            InsightsError::inference(capabilities::CLASSIFY_DELAY, "no output"),
            InsightsError::input_validation("distance_km", "number", "string"),
            InsightsError::model_load("models", "missing metadata.json"),
        ];
        let kinds: Vec<_> = errors.iter().map(|e| e.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                "schema_error",
                "inference_failure",
                "input_validation_error",
                "model_load_error"
            ]
        );
    }

    #[test]
    fn test_only_validation_is_client_error() {
        assert!(InsightsError::input_validation("x", "number", "bool").is_client_error());
        assert!(!InsightsError::inference(capabilities::CLASSIFY_ANOMALY, "boom").is_client_error());
        assert!(!InsightsError::schema("anomaly/v1", "order").is_client_error());
    }

    #[test]
    fn test_display_carries_detail() {
        let err = InsightsError::input_validation("route_complexity", "integer", "string \"high\"");
        let msg = err.to_string();
        assert!(msg.contains("route_complexity"));
        assert!(msg.contains("integer"));
        assert!(msg.contains("\"high\""));
    }
}
