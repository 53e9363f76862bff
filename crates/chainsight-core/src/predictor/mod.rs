//! ML prediction engine

mod features;
mod inference;
mod registry;
mod risk;
mod temporal;

pub use features::{
    defaults, FeatureSchema, FeatureVector, FeatureVectorizer, ANOMALY_SCHEMA, DELAY_SCHEMA,
};
pub use inference::{
    compute_checksum, HeuristicRegistry, OnnxModelRegistry, HEURISTIC_VERSION,
    METADATA_FILE,
};
pub use registry::{
    default_season_classes, encode_with_classes, Classification, ModelArtifact, ModelFiles,
    ModelMetadata, ModelRegistry,
};
pub use risk::{
    RiskConfig, RiskLevel, RiskScorer, ANOMALY_WEIGHT, DELAY_WEIGHT, HIGH_PROBABILITY_THRESHOLD,
    HIGH_SCORE_THRESHOLD, MEDIUM_PROBABILITY_THRESHOLD, MEDIUM_SCORE_THRESHOLD,
};
pub use temporal::{Clock, FixedClock, Season, SystemClock, TemporalContext};

use crate::error::{capabilities, InsightsError, Result};
use crate::models::{AnomalyPrediction, DelayPrediction, PredictionResult, ShipmentInput};
use tracing::debug;

/// Classify delay and, for delayed shipments, estimate the duration
///
/// The duration regressor only runs when the classifier says delayed and
/// reuses the same feature vector. Negative estimates are floored at zero.
pub fn assess_delay(
    input: &ShipmentInput,
    vectorizer: &FeatureVectorizer,
    registry: &dyn ModelRegistry,
) -> Result<(Classification, f64)> {
    let features = vectorizer.vectorize_for_delay(input, registry)?;
    let delay = registry
        .classify_delay(&features)?
        .validated(capabilities::CLASSIFY_DELAY)?;

    if !delay.label {
        return Ok((delay, 0.0));
    }

    let hours = registry.regress_delay_duration(&features)?;
    if !hours.is_finite() {
        return Err(InsightsError::inference(
            capabilities::REGRESS_DELAY_DURATION,
            format!("non-finite duration {}", hours),
        ));
    }
    if hours < 0.0 {
        debug!(hours, "Negative delay estimate floored at zero");
    }
    Ok((delay, hours.max(0.0)))
}

/// Classify the anomaly likelihood of a shipment's cargo conditions
pub fn assess_anomaly(
    input: &ShipmentInput,
    vectorizer: &FeatureVectorizer,
    registry: &dyn ModelRegistry,
) -> Result<Classification> {
    let features = vectorizer.vectorize_for_anomaly(input, registry)?;
    registry
        .classify_anomaly(&features)?
        .validated(capabilities::CLASSIFY_ANOMALY)
}

/// Run every capability for one shipment and compose the risk
pub fn score_shipment(
    input: &ShipmentInput,
    vectorizer: &FeatureVectorizer,
    registry: &dyn ModelRegistry,
    scorer: &RiskScorer,
) -> Result<PredictionResult> {
    let (delay, estimated_delay_hours) = assess_delay(input, vectorizer, registry)?;
    let anomaly = assess_anomaly(input, vectorizer, registry)?;
    let (risk_score, risk_level) = scorer.score(delay.probability, anomaly.probability);

    Ok(PredictionResult {
        shipment_id: input.id_or_unknown().to_string(),
        delay_probability: delay.probability,
        is_delayed: delay.label,
        estimated_delay_hours,
        anomaly_probability: anomaly.probability,
        has_anomaly: anomaly.label,
        risk_score,
        risk_level,
    })
}

/// Delay answer with a level from the delay probability alone
pub fn predict_delay(
    input: &ShipmentInput,
    vectorizer: &FeatureVectorizer,
    registry: &dyn ModelRegistry,
) -> Result<DelayPrediction> {
    let (delay, estimated_delay_hours) = assess_delay(input, vectorizer, registry)?;
    Ok(DelayPrediction {
        is_delayed: delay.label,
        delay_probability: delay.probability,
        estimated_delay_hours,
        risk_level: RiskLevel::from_probability(delay.probability),
    })
}

/// Anomaly answer with a level from the anomaly probability alone
pub fn predict_anomaly(
    input: &ShipmentInput,
    vectorizer: &FeatureVectorizer,
    registry: &dyn ModelRegistry,
) -> Result<AnomalyPrediction> {
    let anomaly = assess_anomaly(input, vectorizer, registry)?;
    Ok(AnomalyPrediction {
        has_anomaly: anomaly.label,
        anomaly_probability: anomaly.probability,
        risk_level: RiskLevel::from_probability(anomaly.probability),
    })
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn test_score_shipment_composes_outputs() {
        let registry = ScriptedRegistry::new().on(800.0, (true, 0.8), 14.5, (false, 0.0));
        let result = score_shipment(
            &shipment(800.0),
            &fixed_vectorizer(),
            &registry,
            &RiskScorer::new(),
        )
        .unwrap();

        assert_eq!(result.shipment_id, "SH800");
        assert!(result.is_delayed);
        assert_eq!(result.estimated_delay_hours, 14.5);
        assert!((result.risk_score - 48.0).abs() < 1e-9);
        assert_eq!(result.risk_level, RiskLevel::High);
        assert!(!result.has_anomaly);
    }

    #[test]
    fn test_regressor_skipped_when_not_delayed() {
        let registry = ScriptedRegistry::new().on(100.0, (false, 0.3), 99.0, (false, 0.1));
        let result = score_shipment(
            &shipment(100.0),
            &fixed_vectorizer(),
            &registry,
            &RiskScorer::new(),
        )
        .unwrap();

        assert_eq!(result.estimated_delay_hours, 0.0);
        assert_eq!(registry.regress_calls(), 0);
    }

    #[test]
    fn test_negative_duration_floored() {
        let registry = ScriptedRegistry::new().on(100.0, (true, 0.6), -1.5, (false, 0.1));
        let (_, hours) = assess_delay(&shipment(100.0), &fixed_vectorizer(), &registry).unwrap();
        assert_eq!(hours, 0.0);
    }

    #[test]
    fn test_non_finite_duration_is_inference_failure() {
        let registry = ScriptedRegistry::new().on(100.0, (true, 0.6), f64::NAN, (false, 0.1));
        let err = assess_delay(&shipment(100.0), &fixed_vectorizer(), &registry).unwrap_err();
        assert!(matches!(
            err,
            InsightsError::Inference { capability, .. } if capability == capabilities::REGRESS_DELAY_DURATION
        ));
    }

    #[test]
    fn test_out_of_range_probability_rejected() {
        let registry = ScriptedRegistry::new().on(100.0, (false, 0.2), 0.0, (true, 1.4));
        let err = score_shipment(
            &shipment(100.0),
            &fixed_vectorizer(),
            &registry,
            &RiskScorer::new(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "inference_failure");
    }

    #[test]
    fn test_single_capability_levels() {
        let registry = ScriptedRegistry::new().on(100.0, (true, 0.55), 3.0, (false, 0.75));
        let delay = predict_delay(&shipment(100.0), &fixed_vectorizer(), &registry).unwrap();
        assert_eq!(delay.risk_level, RiskLevel::Medium);
        assert_eq!(delay.estimated_delay_hours, 3.0);

        let anomaly = predict_anomaly(&shipment(100.0), &fixed_vectorizer(), &registry).unwrap();
        assert_eq!(anomaly.risk_level, RiskLevel::High);
        assert!(!anomaly.has_anomaly);
    }

    #[test]
    fn test_schema_skew_stops_scoring() {
        let mut order = DELAY_SCHEMA.field_names();
        order.reverse();
        let registry = ScriptedRegistry::new()
            .on(100.0, (false, 0.2), 0.0, (false, 0.1))
            .with_feature_order(order);
        let err = score_shipment(
            &shipment(100.0),
            &fixed_vectorizer(),
            &registry,
            &RiskScorer::new(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "schema_error");
    }
}
