//! Model registry capability boundary
//!
//! The pipeline only ever talks to a [`ModelRegistry`]: "given a feature
//! vector, return a probability and/or a class". How the models behind it
//! were trained or stored is not its concern.

use super::features::{FeatureVector, ANOMALY_SCHEMA, DELAY_SCHEMA};
use crate::error::{capabilities, InsightsError, Result};
use serde::{Deserialize, Serialize};

/// Output of a binary classifier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: bool,
    /// Probability of the positive class
    pub probability: f64,
}

impl Classification {
    pub fn new(label: bool, probability: f64) -> Self {
        Self { label, probability }
    }

    /// Reject non-finite or out-of-range probabilities
    pub fn validated(self, capability: &'static str) -> Result<Self> {
        if !self.probability.is_finite() || !(0.0..=1.0).contains(&self.probability) {
            return Err(InsightsError::inference(
                capability,
                format!("probability {} outside [0, 1]", self.probability),
            ));
        }
        Ok(self)
    }
}

/// Predictive capabilities the pipeline depends on
///
/// Implementations are immutable after construction and shared across
/// threads.
pub trait ModelRegistry: Send + Sync {
    /// Delay classifier over a delay-schema vector
    fn classify_delay(&self, features: &FeatureVector) -> Result<Classification>;

    /// Expected delay in hours; only meaningful for delayed shipments
    fn regress_delay_duration(&self, features: &FeatureVector) -> Result<f64>;

    /// Anomaly classifier over an anomaly-schema vector
    fn classify_anomaly(&self, features: &FeatureVector) -> Result<Classification>;

    /// Fitted categorical encoding of a season name
    fn encode_season(&self, season: &str) -> Result<i64>;

    /// Delay feature order the models were fit against
    fn declared_feature_order(&self) -> &[String];

    /// Anomaly feature order, when the registry declares one
    fn declared_anomaly_feature_order(&self) -> Option<&[String]> {
        None
    }

    fn metadata(&self) -> &ModelMetadata;

    fn version(&self) -> &str {
        &self.metadata().version
    }
}

/// Encode a season as its index in a sorted-label class list
pub fn encode_with_classes(classes: &[String], season: &str) -> Result<i64> {
    classes
        .iter()
        .position(|c| c == season)
        .map(|idx| idx as i64)
        .ok_or_else(|| {
            InsightsError::inference(
                capabilities::ENCODE_SEASON,
                format!("unknown season {:?}, encoder knows {:?}", season, classes),
            )
        })
}

/// Season classes in the order a label encoder fit on them assigns codes
pub fn default_season_classes() -> Vec<String> {
    ["Fall", "Spring", "Summer", "Winter"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// A model file and its optional SHA-256 checksum
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

impl ModelArtifact {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            sha256: None,
        }
    }
}

/// Model files of a registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelFiles {
    #[serde(default = "default_delay_classifier")]
    pub delay_classifier: ModelArtifact,
    #[serde(default = "default_delay_regressor")]
    pub delay_regressor: ModelArtifact,
    #[serde(default = "default_anomaly_detector")]
    pub anomaly_detector: ModelArtifact,
}

fn default_delay_classifier() -> ModelArtifact {
    ModelArtifact::new("delay_classifier.onnx")
}

fn default_delay_regressor() -> ModelArtifact {
    ModelArtifact::new("delay_regressor.onnx")
}

fn default_anomaly_detector() -> ModelArtifact {
    ModelArtifact::new("anomaly_detector.onnx")
}

impl Default for ModelFiles {
    fn default() -> Self {
        Self {
            delay_classifier: default_delay_classifier(),
            delay_regressor: default_delay_regressor(),
            anomaly_detector: default_anomaly_detector(),
        }
    }
}

/// Contents of `metadata.json` next to the exported models
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trained_at: Option<String>,
    /// Delay feature order used at training time
    pub feature_cols: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anomaly_feature_cols: Option<Vec<String>>,
    #[serde(default = "default_season_classes")]
    pub season_classes: Vec<String>,
    #[serde(default)]
    pub models: ModelFiles,
}

impl ModelMetadata {
    /// Metadata matching the schemas this build vectorizes for
    pub fn for_current_schemas(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            trained_at: None,
            feature_cols: DELAY_SCHEMA.field_names(),
            anomaly_feature_cols: Some(ANOMALY_SCHEMA.field_names()),
            season_classes: default_season_classes(),
            models: ModelFiles::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_season_encoding_sorted_labels() {
        let classes = default_season_classes();
        assert_eq!(encode_with_classes(&classes, "Fall").unwrap(), 0);
        assert_eq!(encode_with_classes(&classes, "Spring").unwrap(), 1);
        assert_eq!(encode_with_classes(&classes, "Summer").unwrap(), 2);
        assert_eq!(encode_with_classes(&classes, "Winter").unwrap(), 3);
    }

    #[test]
    fn test_unknown_season_is_inference_failure() {
        let err = encode_with_classes(&default_season_classes(), "Monsoon").unwrap_err();
        assert!(matches!(
            err,
            InsightsError::Inference { capability, .. } if capability == capabilities::ENCODE_SEASON
        ));
    }

    #[test]
    fn test_classification_validation() {
        assert!(Classification::new(true, 0.9).validated("test").is_ok());
        assert!(Classification::new(false, 0.0).validated("test").is_ok());
        assert!(Classification::new(true, 1.2).validated("test").is_err());
        assert!(Classification::new(true, f64::NAN).validated("test").is_err());
    }

    #[test]
    fn test_metadata_defaults_from_minimal_json() {
        let meta: ModelMetadata = serde_json::from_str(
            r#"{"version": "1.0.0", "feature_cols": ["distance_km"]}"#,
        )
        .unwrap();
        assert_eq!(meta.season_classes, default_season_classes());
        assert_eq!(meta.models.delay_classifier.file, "delay_classifier.onnx");
        assert!(meta.models.anomaly_detector.sha256.is_none());
        assert!(meta.anomaly_feature_cols.is_none());
    }

    #[test]
    fn test_metadata_for_current_schemas() {
        let meta = ModelMetadata::for_current_schemas("test");
        assert_eq!(meta.feature_cols.len(), 11);
        assert_eq!(meta.anomaly_feature_cols.as_ref().map(|c| c.len()), Some(5));
    }
}
