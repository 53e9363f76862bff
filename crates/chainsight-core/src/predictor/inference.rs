//! Model registries: ONNX inference using tract, and a heuristic fallback
//!
//! The ONNX registry loads three models exported from the training
//! pipeline plus their `metadata.json`. Plans are optimized once at load
//! time and never mutated afterwards, so a single registry can serve
//! concurrent callers.

use super::features::{defaults, FeatureVector, ANOMALY_SCHEMA, DELAY_SCHEMA};
use super::registry::{encode_with_classes, Classification, ModelMetadata, ModelRegistry};
use crate::error::{capabilities, InsightsError, Result};
use crate::observability::InsightsMetrics;
use anyhow::Context;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tract_onnx::prelude::*;
use tracing::{debug, info, warn};

/// Metadata file expected next to the models
pub const METADATA_FILE: &str = "metadata.json";

/// Version reported by the heuristic registry
pub const HEURISTIC_VERSION: &str = "heuristic";

/// Maximum inference latency before warning (5ms target)
const MAX_INFERENCE_MS: u128 = 5;

type TractModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Registry backed by ONNX models
pub struct OnnxModelRegistry {
    delay_classifier: TractModel,
    delay_regressor: TractModel,
    anomaly_detector: TractModel,
    metadata: ModelMetadata,
    model_dir: PathBuf,
    metrics: InsightsMetrics,
}

impl OnnxModelRegistry {
    /// Load models and metadata from a directory
    pub fn load(model_dir: impl AsRef<Path>) -> Result<Self> {
        let dir = model_dir.as_ref();
        let metadata = Self::load_metadata(dir)?;

        let delay_features = metadata.feature_cols.len();
        let anomaly_features = metadata
            .anomaly_feature_cols
            .as_ref()
            .map(|cols| cols.len())
            .unwrap_or(ANOMALY_SCHEMA.len());

        let load = |file: &str, sha256: Option<&str>, num_features: usize| {
            Self::load_model(&dir.join(file), num_features, sha256)
                .map_err(|e| InsightsError::model_load(dir.display().to_string(), format!("{:#}", e)))
        };

        let files = &metadata.models;
        let delay_classifier = load(
            &files.delay_classifier.file,
            files.delay_classifier.sha256.as_deref(),
            delay_features,
        )?;
        let delay_regressor = load(
            &files.delay_regressor.file,
            files.delay_regressor.sha256.as_deref(),
            delay_features,
        )?;
        let anomaly_detector = load(
            &files.anomaly_detector.file,
            files.anomaly_detector.sha256.as_deref(),
            anomaly_features,
        )?;

        info!(
            model_dir = %dir.display(),
            version = %metadata.version,
            delay_features,
            anomaly_features,
            "Loaded ONNX models"
        );

        Ok(Self {
            delay_classifier,
            delay_regressor,
            anomaly_detector,
            metadata,
            model_dir: dir.to_path_buf(),
            metrics: InsightsMetrics::new(),
        })
    }

    /// Read and parse `metadata.json`
    pub fn load_metadata(model_dir: &Path) -> Result<ModelMetadata> {
        let path = model_dir.join(METADATA_FILE);
        let content = std::fs::read_to_string(&path).map_err(|e| {
            InsightsError::model_load(model_dir.display().to_string(), format!("{}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            InsightsError::model_load(
                model_dir.display().to_string(),
                format!("invalid {}: {}", METADATA_FILE, e),
            )
        })
    }

    /// Load, verify and optimize one ONNX model
    fn load_model(
        path: &Path,
        num_features: usize,
        expected_sha256: Option<&str>,
    ) -> anyhow::Result<TractModel> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read model file {}", path.display()))?;

        if let Some(expected) = expected_sha256 {
            let computed = compute_checksum(&bytes);
            if !computed.eq_ignore_ascii_case(expected) {
                anyhow::bail!(
                    "Checksum mismatch for {}: expected {}, got {}",
                    path.display(),
                    expected,
                    computed
                );
            }
            debug!(path = %path.display(), checksum = %computed, "Model checksum validated");
        }

        let model = tract_onnx::onnx()
            .model_for_read(&mut std::io::Cursor::new(&bytes))
            .context("Failed to parse ONNX model")?
            .with_input_fact(0, f32::fact([1, num_features]).into())
            .context("Failed to set input shape")?
            .into_optimized()
            .context("Failed to optimize model")?
            .into_runnable()
            .context("Failed to create runnable model")?;
        Ok(model)
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    fn run(
        &self,
        model: &TractModel,
        features: &FeatureVector,
        capability: &'static str,
    ) -> Result<TVec<TValue>> {
        let start = Instant::now();

        let input: Tensor =
            tract_ndarray::Array2::from_shape_vec((1, features.len()), features.values().to_vec())
                .map_err(|e| InsightsError::inference(capability, e))?
                .into();

        let outputs = model
            .run(tvec!(input.into()))
            .map_err(|e| InsightsError::inference(capability, format!("{:#}", e)))?;

        let elapsed = start.elapsed();
        let slow = elapsed.as_millis() > MAX_INFERENCE_MS;
        self.metrics.record_inference(capability, slow);

        if slow {
            warn!(
                capability,
                elapsed_ms = elapsed.as_millis() as u64,
                "Inference exceeded {}ms target",
                MAX_INFERENCE_MS
            );
        } else {
            debug!(capability, elapsed_us = elapsed.as_micros() as u64, "Inference completed");
        }

        Ok(outputs)
    }
}

/// Read a classifier's label and positive-class probability
///
/// Expects an int64 label output and a float probability output of shape
/// `[1, 2]` (positive class in column 1). A single-column probability is
/// taken as the positive class. Without a label output, the label is
/// `probability >= 0.5`.
fn parse_classification(outputs: &[TValue], capability: &'static str) -> Result<Classification> {
    let mut label = None;
    let mut probability = None;

    for output in outputs {
        if let Ok(view) = output.to_array_view::<i64>() {
            if label.is_none() {
                label = view.iter().next().map(|v| *v == 1);
            }
        } else if let Ok(view) = output.to_array_view::<f32>() {
            if probability.is_none() {
                let values: Vec<f32> = view.iter().copied().collect();
                probability = match values.len() {
                    0 => None,
                    1 => Some(values[0]),
                    _ => Some(values[1]),
                };
            }
        }
    }

    let probability = probability
        .map(f64::from)
        .ok_or_else(|| InsightsError::inference(capability, "model produced no probability output"))?;
    let label = label.unwrap_or(probability >= 0.5);

    Classification::new(label, probability).validated(capability)
}

fn parse_regression(outputs: &[TValue], capability: &'static str) -> Result<f64> {
    let value = outputs
        .iter()
        .filter_map(|o| o.to_array_view::<f32>().ok())
        .find_map(|view| view.iter().next().copied())
        .ok_or_else(|| InsightsError::inference(capability, "model produced no regression output"))?;

    let value = f64::from(value);
    if !value.is_finite() {
        return Err(InsightsError::inference(
            capability,
            format!("non-finite duration {}", value),
        ));
    }
    Ok(value)
}

impl ModelRegistry for OnnxModelRegistry {
    fn classify_delay(&self, features: &FeatureVector) -> Result<Classification> {
        features.ensure_schema(&DELAY_SCHEMA)?;
        let outputs = self.run(&self.delay_classifier, features, capabilities::CLASSIFY_DELAY)?;
        parse_classification(&outputs, capabilities::CLASSIFY_DELAY)
    }

    fn regress_delay_duration(&self, features: &FeatureVector) -> Result<f64> {
        features.ensure_schema(&DELAY_SCHEMA)?;
        let outputs = self.run(
            &self.delay_regressor,
            features,
            capabilities::REGRESS_DELAY_DURATION,
        )?;
        parse_regression(&outputs, capabilities::REGRESS_DELAY_DURATION)
    }

    fn classify_anomaly(&self, features: &FeatureVector) -> Result<Classification> {
        features.ensure_schema(&ANOMALY_SCHEMA)?;
        let outputs = self.run(&self.anomaly_detector, features, capabilities::CLASSIFY_ANOMALY)?;
        parse_classification(&outputs, capabilities::CLASSIFY_ANOMALY)
    }

    fn encode_season(&self, season: &str) -> Result<i64> {
        encode_with_classes(&self.metadata.season_classes, season)
    }

    fn declared_feature_order(&self) -> &[String] {
        &self.metadata.feature_cols
    }

    fn declared_anomaly_feature_order(&self) -> Option<&[String]> {
        self.metadata.anomaly_feature_cols.as_deref()
    }

    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }
}

/// Compute SHA256 checksum of data
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Mean delay in hours of the delayed shipments the models were trained on
const BASE_DELAY_HOURS: f64 = 12.0;

/// Registry that uses simple heuristics when no model is available
///
/// Probabilities follow the relationships the training data was generated
/// from, so results are in the same ballpark as the trained models.
#[derive(Debug, Clone)]
pub struct HeuristicRegistry {
    metadata: ModelMetadata,
}

impl HeuristicRegistry {
    pub fn new() -> Self {
        Self {
            metadata: ModelMetadata::for_current_schemas(HEURISTIC_VERSION),
        }
    }

    fn feature(features: &FeatureVector, name: &str, capability: &'static str) -> Result<f64> {
        features
            .get(name)
            .map(f64::from)
            .ok_or_else(|| InsightsError::inference(capability, format!("missing feature `{}`", name)))
    }

    /// Delay likelihood rising with distance, variance and complexity and
    /// falling with carrier rating and weather score
    pub fn delay_probability(
        distance_km: f64,
        temperature_variance: f64,
        route_complexity: f64,
        carrier_rating: f64,
        weather_score: f64,
    ) -> f64 {
        let p = 0.1
            + (distance_km / 10000.0) * 0.3
            + (temperature_variance / 20.0) * 0.2
            + (route_complexity / 10.0) * 0.2
            + (1.0 - carrier_rating / 5.0) * 0.15
            + (1.0 - weather_score / 10.0) * 0.15;
        p.clamp(0.0, 1.0)
    }

    /// Temperature breach likelihood from variance
    pub fn anomaly_probability(temperature_variance: f64) -> f64 {
        ((temperature_variance / 15.0) * 0.5).clamp(0.0, 1.0)
    }
}

impl Default for HeuristicRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelRegistry for HeuristicRegistry {
    fn classify_delay(&self, features: &FeatureVector) -> Result<Classification> {
        features.ensure_schema(&DELAY_SCHEMA)?;
        let cap = capabilities::CLASSIFY_DELAY;
        let p = Self::delay_probability(
            Self::feature(features, "distance_km", cap)?,
            Self::feature(features, "temperature_variance", cap)?,
            Self::feature(features, "route_complexity", cap)?,
            Self::feature(features, "carrier_rating", cap)?,
            Self::feature(features, "weather_score", cap)?,
        );
        Ok(Classification::new(p >= 0.5, p))
    }

    fn regress_delay_duration(&self, features: &FeatureVector) -> Result<f64> {
        features.ensure_schema(&DELAY_SCHEMA)?;
        let complexity = Self::feature(
            features,
            "route_complexity",
            capabilities::REGRESS_DELAY_DURATION,
        )?;
        Ok((BASE_DELAY_HOURS * complexity / defaults::ROUTE_COMPLEXITY as f64).max(0.0))
    }

    fn classify_anomaly(&self, features: &FeatureVector) -> Result<Classification> {
        features.ensure_schema(&ANOMALY_SCHEMA)?;
        let variance = Self::feature(
            features,
            "temperature_variance",
            capabilities::CLASSIFY_ANOMALY,
        )?;
        let p = Self::anomaly_probability(variance);
        Ok(Classification::new(p >= 0.5, p))
    }

    fn encode_season(&self, season: &str) -> Result<i64> {
        encode_with_classes(&self.metadata.season_classes, season)
    }

    fn declared_feature_order(&self) -> &[String] {
        &self.metadata.feature_cols
    }

    fn declared_anomaly_feature_order(&self) -> Option<&[String]> {
        self.metadata.anomaly_feature_cols.as_deref()
    }

    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ShipmentInput;
    use crate::predictor::registry::ModelArtifact;
    use crate::predictor::{FeatureVectorizer, FixedClock, TemporalContext};
    use tempfile::TempDir;

    fn vectorizer() -> FeatureVectorizer {
        FeatureVectorizer::new(TemporalContext::fixed(
            FixedClock::on_date(2024, 7, 4).unwrap(),
        ))
    }

    fn outputs(tensors: Vec<Tensor>) -> TVec<TValue> {
        tensors.into_iter().map(|t| t.into()).collect()
    }

    #[test]
    fn test_classification_reads_label_and_positive_column() {
        let out = outputs(vec![tensor1(&[1i64]), tensor2(&[[0.3f32, 0.7]])]);
        let c = parse_classification(&out, capabilities::CLASSIFY_DELAY).unwrap();
        assert!(c.label);
        assert!((c.probability - 0.7).abs() < 1e-6, "p was {}", c.probability);
    }

    #[test]
    fn test_classification_keeps_model_label() {
        // The exported label output wins over thresholding the probability.
        let out = outputs(vec![tensor1(&[0i64]), tensor2(&[[0.45f32, 0.55]])]);
        let c = parse_classification(&out, capabilities::CLASSIFY_ANOMALY).unwrap();
        assert!(!c.label);
        assert!((c.probability - 0.55).abs() < 1e-6);
    }

    #[test]
    fn test_classification_single_column_without_label() {
        let out = outputs(vec![tensor2(&[[0.8f32]])]);
        let c = parse_classification(&out, capabilities::CLASSIFY_DELAY).unwrap();
        assert!(c.label);
        assert!((c.probability - 0.8).abs() < 1e-6);

        let out = outputs(vec![tensor2(&[[0.5f32]])]);
        assert!(parse_classification(&out, capabilities::CLASSIFY_DELAY).unwrap().label);

        let out = outputs(vec![tensor2(&[[0.4f32]])]);
        assert!(!parse_classification(&out, capabilities::CLASSIFY_DELAY).unwrap().label);
    }

    #[test]
    fn test_classification_without_probability_fails() {
        let out = outputs(vec![tensor1(&[1i64])]);
        let err = parse_classification(&out, capabilities::CLASSIFY_ANOMALY).unwrap_err();
        match err {
            InsightsError::Inference { capability, reason } => {
                assert_eq!(capability, capabilities::CLASSIFY_ANOMALY);
                assert!(reason.contains("no probability output"), "{}", reason);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_classification_rejects_out_of_range_probability() {
        let out = outputs(vec![tensor1(&[1i64]), tensor2(&[[-0.5f32, 1.5]])]);
        let err = parse_classification(&out, capabilities::CLASSIFY_DELAY).unwrap_err();
        assert_eq!(err.kind(), "inference_failure");
    }

    #[test]
    fn test_regression_output() {
        let out = outputs(vec![tensor2(&[[14.5f32]])]);
        let hours = parse_regression(&out, capabilities::REGRESS_DELAY_DURATION).unwrap();
        assert!((hours - 14.5).abs() < 1e-9);
    }

    #[test]
    fn test_regression_rejects_non_finite_or_missing() {
        let out = outputs(vec![tensor2(&[[f32::NAN]])]);
        let err = parse_regression(&out, capabilities::REGRESS_DELAY_DURATION).unwrap_err();
        assert!(err.to_string().contains("non-finite"), "{}", err);

        let out = outputs(vec![tensor2(&[[f32::INFINITY]])]);
        assert!(parse_regression(&out, capabilities::REGRESS_DELAY_DURATION).is_err());

        let out = outputs(vec![tensor1(&[3i64])]);
        let err = parse_regression(&out, capabilities::REGRESS_DELAY_DURATION).unwrap_err();
        assert!(err.to_string().contains("no regression output"), "{}", err);
    }

    #[test]
    fn test_compute_checksum() {
        assert_eq!(
            compute_checksum(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_heuristic_defaults_not_delayed() {
        let registry = HeuristicRegistry::new();
        let features = vectorizer()
            .vectorize_for_delay(&ShipmentInput::default(), &registry)
            .unwrap();
        let c = registry.classify_delay(&features).unwrap();
        assert!((c.probability - 0.3).abs() < 1e-6, "p was {}", c.probability);
        assert!(!c.label);
    }

    #[test]
    fn test_heuristic_risky_shipment_delayed() {
        let registry = HeuristicRegistry::new();
        let input = ShipmentInput {
            distance_km: Some(5000.0),
            temperature_variance: Some(15.0),
            route_complexity: Some(5),
            carrier_rating: Some(1.0),
            weather_score: Some(0.0),
            ..Default::default()
        };
        let features = vectorizer().vectorize_for_delay(&input, &registry).unwrap();
        let c = registry.classify_delay(&features).unwrap();
        assert!(c.label);
        assert!((c.probability - 0.77).abs() < 1e-6, "p was {}", c.probability);
        assert!((registry.regress_delay_duration(&features).unwrap() - 20.0).abs() < 1e-9);

        let anomaly_features = vectorizer().vectorize_for_anomaly(&input, &registry).unwrap();
        let a = registry.classify_anomaly(&anomaly_features).unwrap();
        assert!((a.probability - 0.5).abs() < 1e-9);
        assert!(a.label);
    }

    #[test]
    fn test_heuristic_rejects_wrong_schema() {
        let registry = HeuristicRegistry::new();
        let anomaly_features = vectorizer()
            .vectorize_for_anomaly(&ShipmentInput::default(), &registry)
            .unwrap();
        let err = registry.classify_delay(&anomaly_features).unwrap_err();
        assert_eq!(err.kind(), "schema_error");
    }

    #[test]
    fn test_heuristic_declares_current_schemas() {
        let registry = HeuristicRegistry::new();
        assert!(vectorizer().validate(&registry).is_ok());
        assert_eq!(registry.version(), HEURISTIC_VERSION);
        assert_eq!(registry.encode_season("Summer").unwrap(), 2);
    }

    #[test]
    fn test_load_missing_metadata() {
        let dir = TempDir::new().unwrap();
        let err = OnnxModelRegistry::load(dir.path()).err().unwrap();
        assert_eq!(err.kind(), "model_load_error");
        assert!(err.to_string().contains(METADATA_FILE));
    }

    #[test]
    fn test_load_invalid_metadata() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(METADATA_FILE), "{ not json").unwrap();
        let err = OnnxModelRegistry::load(dir.path()).err().unwrap();
        assert!(err.to_string().contains("invalid metadata.json"));
    }

    #[test]
    fn test_load_missing_model_file() {
        let dir = TempDir::new().unwrap();
        let metadata = ModelMetadata::for_current_schemas("1.0.0");
        std::fs::write(
            dir.path().join(METADATA_FILE),
            serde_json::to_string(&metadata).unwrap(),
        )
        .unwrap();

        let err = OnnxModelRegistry::load(dir.path()).err().unwrap();
        assert_eq!(err.kind(), "model_load_error");
        assert!(err.to_string().contains("delay_classifier.onnx"));
    }

    #[test]
    fn test_load_rejects_checksum_mismatch() {
        let dir = TempDir::new().unwrap();
        let mut metadata = ModelMetadata::for_current_schemas("1.0.0");
        metadata.models.delay_classifier = ModelArtifact {
            file: "delay_classifier.onnx".into(),
            sha256: Some(compute_checksum(b"expected bytes")),
        };
        std::fs::write(
            dir.path().join(METADATA_FILE),
            serde_json::to_string(&metadata).unwrap(),
        )
        .unwrap();
        std::fs::write(dir.path().join("delay_classifier.onnx"), b"tampered bytes").unwrap();

        let err = OnnxModelRegistry::load(dir.path()).err().unwrap();
        assert!(err.to_string().contains("Checksum mismatch"), "{}", err);
    }

    #[test]
    fn test_load_rejects_garbage_model() {
        let dir = TempDir::new().unwrap();
        let metadata = ModelMetadata::for_current_schemas("1.0.0");
        std::fs::write(
            dir.path().join(METADATA_FILE),
            serde_json::to_string(&metadata).unwrap(),
        )
        .unwrap();
        std::fs::write(dir.path().join("delay_classifier.onnx"), b"not an onnx model").unwrap();

        let err = OnnxModelRegistry::load(dir.path()).err().unwrap();
        assert_eq!(err.kind(), "model_load_error");
    }
}
