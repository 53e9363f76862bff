//! Shipment predictor facade
//!
//! Bundles a model registry with the vectorizer, scorer and aggregator so
//! callers score shipments without wiring the pipeline themselves. Every
//! call records latency and outcome metrics.

use crate::error::Result;
use crate::insights::{InsightsAggregator, InsightsConfig, ANOMALY_COUNT_THRESHOLD};
use crate::models::{
    AnomalyPrediction, DelayPrediction, InsightsSummary, PredictionResult, ShipmentInput,
};
use crate::observability::InsightsMetrics;
use crate::predictor::{
    self, FeatureVectorizer, ModelRegistry, RiskScorer, HIGH_PROBABILITY_THRESHOLD,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Scores single shipments and batches against one model registry
#[derive(Clone)]
pub struct ShipmentPredictor {
    registry: Arc<dyn ModelRegistry>,
    vectorizer: FeatureVectorizer,
    scorer: RiskScorer,
    aggregator: InsightsAggregator,
    metrics: InsightsMetrics,
}

impl std::fmt::Debug for ShipmentPredictor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShipmentPredictor")
            .field("model_version", &self.registry.version())
            .field("vectorizer", &self.vectorizer)
            .field("aggregator", &self.aggregator)
            .finish()
    }
}

impl ShipmentPredictor {
    /// Build a predictor, failing if the registry's declared feature order
    /// does not match the vectorizer
    pub fn new(registry: Arc<dyn ModelRegistry>, vectorizer: FeatureVectorizer) -> Result<Self> {
        vectorizer.validate(registry.as_ref())?;
        let scorer = RiskScorer::new();
        Ok(Self {
            registry,
            vectorizer,
            aggregator: InsightsAggregator::new(InsightsConfig::default(), scorer.clone()),
            scorer,
            metrics: InsightsMetrics::new(),
        })
    }

    pub fn with_insights_config(mut self, config: InsightsConfig) -> Self {
        self.aggregator = InsightsAggregator::new(config, self.scorer.clone());
        self
    }

    pub fn with_scorer(mut self, scorer: RiskScorer) -> Self {
        self.aggregator = InsightsAggregator::new(self.aggregator.config().clone(), scorer.clone());
        self.scorer = scorer;
        self
    }

    pub fn registry(&self) -> &dyn ModelRegistry {
        self.registry.as_ref()
    }

    pub fn model_version(&self) -> &str {
        self.registry.version()
    }

    /// Full prediction for one shipment
    pub fn score_single(&self, input: &ShipmentInput) -> Result<PredictionResult> {
        let start = Instant::now();
        let result = predictor::score_shipment(
            input,
            &self.vectorizer,
            self.registry.as_ref(),
            &self.scorer,
        );
        self.metrics
            .observe_prediction_latency(start.elapsed().as_secs_f64());

        match &result {
            Ok(r) => self.metrics.record_prediction(
                r.is_delayed,
                r.anomaly_probability > ANOMALY_COUNT_THRESHOLD,
                r.delay_probability > HIGH_PROBABILITY_THRESHOLD
                    || r.anomaly_probability > HIGH_PROBABILITY_THRESHOLD,
            ),
            Err(e) => self.metrics.inc_prediction_errors(e.kind()),
        }
        result
    }

    /// Aggregate a batch into a fleet summary
    pub fn score_batch(&self, inputs: &[ShipmentInput]) -> Result<InsightsSummary> {
        let start = Instant::now();
        let result = self
            .aggregator
            .aggregate(inputs, &self.vectorizer, self.registry.as_ref());
        let elapsed = start.elapsed();
        self.metrics.observe_batch_latency(elapsed.as_secs_f64());

        match &result {
            Ok(summary) => {
                self.metrics.record_batch(summary);
                debug!(
                    total = summary.total_shipments,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Batch scored"
                );
            }
            Err(e) => self.metrics.inc_prediction_errors(e.kind()),
        }
        result
    }

    /// Delay classification and duration only
    pub fn predict_delay(&self, input: &ShipmentInput) -> Result<DelayPrediction> {
        let start = Instant::now();
        let result = predictor::predict_delay(input, &self.vectorizer, self.registry.as_ref());
        self.metrics
            .observe_prediction_latency(start.elapsed().as_secs_f64());
        if let Err(e) = &result {
            self.metrics.inc_prediction_errors(e.kind());
        }
        result
    }

    /// Anomaly classification only
    pub fn predict_anomaly(&self, input: &ShipmentInput) -> Result<AnomalyPrediction> {
        let start = Instant::now();
        let result = predictor::predict_anomaly(input, &self.vectorizer, self.registry.as_ref());
        self.metrics
            .observe_prediction_latency(start.elapsed().as_secs_f64());
        if let Err(e) = &result {
            self.metrics.inc_prediction_errors(e.kind());
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InsightsError;
    use crate::predictor::testing::{fixed_vectorizer, shipment, ScriptedRegistry};
    use crate::predictor::{HeuristicRegistry, RiskLevel, DELAY_SCHEMA};

    fn heuristic_predictor() -> ShipmentPredictor {
        ShipmentPredictor::new(Arc::new(HeuristicRegistry::default()), fixed_vectorizer())
            .unwrap()
    }

    #[test]
    fn test_score_single_is_deterministic_with_fixed_clock() {
        let predictor = heuristic_predictor();
        let input = ShipmentInput {
            shipment_id: Some("SH7".into()),
            distance_km: Some(3200.0),
            temperature_variance: Some(12.0),
            route_complexity: Some(5),
            ..Default::default()
        };

        let first = predictor.score_single(&input).unwrap();
        let second = predictor.score_single(&input).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.shipment_id, "SH7");
    }

    #[test]
    fn test_new_rejects_skewed_registry() {
        let mut order = DELAY_SCHEMA.field_names();
        order.swap(7, 10);
        let registry = ScriptedRegistry::new().with_feature_order(order);

        let err = ShipmentPredictor::new(Arc::new(registry), fixed_vectorizer()).unwrap_err();
        assert!(matches!(err, InsightsError::Schema { .. }));
    }

    #[test]
    fn test_score_batch_empty() {
        let summary = heuristic_predictor().score_batch(&[]).unwrap();
        assert_eq!(summary, InsightsSummary::default());
    }

    #[test]
    fn test_score_batch_failure_counts_error() {
        let registry = ScriptedRegistry::new()
            .on(100.0, (false, 0.1), 0.0, (false, 0.1))
            .failing_on(200.0);
        let predictor = ShipmentPredictor::new(Arc::new(registry), fixed_vectorizer()).unwrap();
        let metrics = InsightsMetrics::new();
        let before = metrics.prediction_errors("inference_failure");

        let err = predictor
            .score_batch(&[shipment(100.0), shipment(200.0)])
            .unwrap_err();
        assert_eq!(err.kind(), "inference_failure");
        assert!(metrics.prediction_errors("inference_failure") > before);
    }

    #[test]
    fn test_insights_config_applied() {
        let predictor = heuristic_predictor().with_insights_config(InsightsConfig {
            preview_limit: 2,
            trend_baseline: Vec::new(),
        });
        let inputs = vec![ShipmentInput::default(); 5];
        let summary = predictor.score_batch(&inputs).unwrap();
        assert_eq!(summary.total_shipments, 5);
        assert_eq!(summary.predictions.len(), 2);
        assert_eq!(summary.trends.len(), 1);
    }

    #[test]
    fn test_single_capability_answers() {
        let predictor = heuristic_predictor();
        let delay = predictor.predict_delay(&ShipmentInput::default()).unwrap();
        assert!(!delay.is_delayed);
        assert_eq!(delay.estimated_delay_hours, 0.0);
        assert_eq!(delay.risk_level, RiskLevel::Low);

        let anomaly = predictor.predict_anomaly(&ShipmentInput::default()).unwrap();
        assert!(!anomaly.has_anomaly);
        assert_eq!(predictor.model_version(), "heuristic");
    }
}
