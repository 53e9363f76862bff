//! Batch scoring and fleet statistics

use super::trend::build_trends;
use super::InsightsConfig;
use crate::error::Result;
use crate::models::{InsightsSummary, PredictionResult, RiskDistribution, ShipmentInput};
use crate::predictor::{
    score_shipment, FeatureVectorizer, ModelRegistry, RiskLevel, RiskScorer,
    HIGH_PROBABILITY_THRESHOLD,
};
use tracing::{debug, warn};

/// Anomaly probability above which a shipment counts as an anomaly
pub const ANOMALY_COUNT_THRESHOLD: f64 = 0.5;

/// Runs a batch through vectorizer, registry and scorer
#[derive(Debug, Clone, Default)]
pub struct InsightsAggregator {
    config: InsightsConfig,
    scorer: RiskScorer,
}

impl InsightsAggregator {
    pub fn new(config: InsightsConfig, scorer: RiskScorer) -> Self {
        Self { config, scorer }
    }

    pub fn config(&self) -> &InsightsConfig {
        &self.config
    }

    /// Score every shipment in input order and summarize
    ///
    /// Any per-shipment failure fails the whole call; no partial summary is
    /// returned.
    pub fn aggregate(
        &self,
        inputs: &[ShipmentInput],
        vectorizer: &FeatureVectorizer,
        registry: &dyn ModelRegistry,
    ) -> Result<InsightsSummary> {
        if inputs.is_empty() {
            return Ok(InsightsSummary::default());
        }

        let mut stats = BatchStats::default();
        let preview_limit = self.config.effective_preview_limit();
        let mut predictions = Vec::with_capacity(inputs.len().min(preview_limit));

        for (index, input) in inputs.iter().enumerate() {
            let result = match score_shipment(input, vectorizer, registry, &self.scorer) {
                Ok(result) => result,
                Err(e) => {
                    warn!(
                        index,
                        shipment_id = %input.id_or_unknown(),
                        kind = e.kind(),
                        error = %e,
                        "Batch aborted on shipment"
                    );
                    return Err(e);
                }
            };

            stats.record(&result);
            debug!(
                index,
                shipment_id = %result.shipment_id,
                risk_score = result.risk_score,
                "Scored shipment"
            );

            if predictions.len() < preview_limit {
                predictions.push(result);
            }
        }

        Ok(stats.into_summary(predictions, &self.config))
    }
}

#[derive(Debug, Default)]
struct BatchStats {
    total: usize,
    delayed: usize,
    delay_hours: f64,
    high_risk: usize,
    anomalies: usize,
    distribution: RiskDistribution,
}

impl BatchStats {
    fn record(&mut self, result: &PredictionResult) {
        self.total += 1;
        if result.is_delayed {
            self.delayed += 1;
            self.delay_hours += result.estimated_delay_hours;
        }
        if result.delay_probability > HIGH_PROBABILITY_THRESHOLD
            || result.anomaly_probability > HIGH_PROBABILITY_THRESHOLD
        {
            self.high_risk += 1;
        }
        if result.anomaly_probability > ANOMALY_COUNT_THRESHOLD {
            self.anomalies += 1;
        }
        self.distribution
            .record(RiskLevel::from_score(result.risk_score));
    }

    fn into_summary(
        self,
        predictions: Vec<PredictionResult>,
        config: &InsightsConfig,
    ) -> InsightsSummary {
        let delay_percentage = if self.total > 0 {
            self.delayed as f64 / self.total as f64 * 100.0
        } else {
            0.0
        };
        let average_delay_hours = if self.delayed > 0 {
            self.delay_hours / self.delayed as f64
        } else {
            0.0
        };

        InsightsSummary {
            total_shipments: self.total,
            delayed_shipments: self.delayed,
            delay_percentage: round2(delay_percentage),
            average_delay_hours: round2(average_delay_hours),
            high_risk_shipments: self.high_risk,
            anomalies_detected: self.anomalies,
            risk_distribution: self.distribution,
            trends: build_trends(
                &config.trend_baseline,
                self.delayed,
                self.total - self.delayed,
            ),
            predictions,
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InsightsError;
    use crate::models::TrendPoint;
    use crate::predictor::testing::{fixed_vectorizer, shipment, ScriptedRegistry};

    fn aggregator() -> InsightsAggregator {
        InsightsAggregator::default()
    }

    fn mixed_registry() -> ScriptedRegistry {
        ScriptedRegistry::new()
            .on(100.0, (true, 0.8), 10.0, (false, 0.2))
            .on(200.0, (true, 0.9), 5.0, (true, 0.9))
            .on(300.0, (false, 0.1), 0.0, (false, 0.6))
    }

    #[test]
    fn test_empty_batch_is_zeroed() {
        let summary = aggregator()
            .aggregate(&[], &fixed_vectorizer(), &mixed_registry())
            .unwrap();

        assert_eq!(summary, InsightsSummary::default());
        assert!(summary.trends.is_empty());
        assert!(summary.predictions.is_empty());
        assert_eq!(summary.risk_distribution.total(), 0);
    }

    #[test]
    fn test_mixed_batch_statistics() {
        let inputs = vec![shipment(100.0), shipment(200.0), shipment(300.0)];
        let summary = aggregator()
            .aggregate(&inputs, &fixed_vectorizer(), &mixed_registry())
            .unwrap();

        assert_eq!(summary.total_shipments, 3);
        assert_eq!(summary.delayed_shipments, 2);
        assert_eq!(summary.delay_percentage, 66.67);
        assert_eq!(summary.average_delay_hours, 7.5);
        assert_eq!(summary.high_risk_shipments, 2);
        assert_eq!(summary.anomalies_detected, 2);
        assert_eq!(
            summary.risk_distribution,
            RiskDistribution {
                low: 1,
                medium: 1,
                high: 1
            }
        );
        assert_eq!(summary.trends.len(), 4);
        assert_eq!(summary.trends[3], TrendPoint::new("Week 4", 2, 1));
    }

    #[test]
    fn test_anomaly_count_and_label_are_independent() {
        // 0.6 counts toward anomalies_detected while the classifier label
        // in the preview stays false.
        let summary = aggregator()
            .aggregate(&[shipment(300.0)], &fixed_vectorizer(), &mixed_registry())
            .unwrap();
        assert_eq!(summary.anomalies_detected, 1);
        assert!(!summary.predictions[0].has_anomaly);
        assert_eq!(summary.high_risk_shipments, 0);
    }

    #[test]
    fn test_no_delays_gives_zero_rates() {
        let registry = ScriptedRegistry::new()
            .on(1.0, (false, 0.2), 0.0, (false, 0.1))
            .on(2.0, (false, 0.3), 0.0, (false, 0.1));
        let summary = aggregator()
            .aggregate(&[shipment(1.0), shipment(2.0)], &fixed_vectorizer(), &registry)
            .unwrap();

        assert_eq!(summary.delayed_shipments, 0);
        assert_eq!(summary.delay_percentage, 0.0);
        assert_eq!(summary.average_delay_hours, 0.0);
        assert_eq!(registry.regress_calls(), 0);
    }

    #[test]
    fn test_preview_capped_in_input_order() {
        let mut registry = ScriptedRegistry::new();
        let mut inputs = Vec::new();
        for i in 1..=12 {
            // Later shipments are riskier, so order must not follow risk.
            let p = i as f64 / 13.0;
            registry = registry.on(i as f32, (p > 0.5, p), 1.0, (false, 0.0));
            inputs.push(shipment(i as f64));
        }

        let summary = aggregator()
            .aggregate(&inputs, &fixed_vectorizer(), &registry)
            .unwrap();

        assert_eq!(summary.total_shipments, 12);
        assert_eq!(summary.predictions.len(), 10);
        let ids: Vec<&str> = summary
            .predictions
            .iter()
            .map(|p| p.shipment_id.as_str())
            .collect();
        assert_eq!(
            ids,
            vec!["SH1", "SH2", "SH3", "SH4", "SH5", "SH6", "SH7", "SH8", "SH9", "SH10"]
        );
    }

    #[test]
    fn test_missing_id_reported_as_unknown() {
        let registry = ScriptedRegistry::new().on(500.0, (false, 0.2), 0.0, (false, 0.1));
        let summary = aggregator()
            .aggregate(&[ShipmentInput::default()], &fixed_vectorizer(), &registry)
            .unwrap();
        assert_eq!(summary.predictions[0].shipment_id, "unknown");
    }

    #[test]
    fn test_mid_batch_failure_fails_whole_call() {
        let registry = mixed_registry().failing_on(200.0);
        let inputs = vec![shipment(100.0), shipment(200.0), shipment(300.0)];

        let err = aggregator()
            .aggregate(&inputs, &fixed_vectorizer(), &registry)
            .unwrap_err();
        assert!(matches!(err, InsightsError::Inference { .. }));
    }

    #[test]
    fn test_custom_config() {
        let aggregator = InsightsAggregator::new(
            InsightsConfig {
                preview_limit: 1,
                trend_baseline: Vec::new(),
            },
            RiskScorer::new(),
        );
        let inputs = vec![shipment(100.0), shipment(300.0)];
        let summary = aggregator
            .aggregate(&inputs, &fixed_vectorizer(), &mixed_registry())
            .unwrap();

        assert_eq!(summary.predictions.len(), 1);
        assert_eq!(summary.trends, vec![TrendPoint::new("Week 1", 1, 1)]);
        assert_eq!(summary.delay_percentage, 50.0);
    }

    #[test]
    fn test_oversized_preview_limit_still_capped_at_ten() {
        let aggregator = InsightsAggregator::new(
            InsightsConfig {
                preview_limit: 25,
                ..Default::default()
            },
            RiskScorer::new(),
        );
        let mut registry = ScriptedRegistry::new();
        let mut inputs = Vec::new();
        for i in 1..=20 {
            registry = registry.on(i as f32, (false, 0.2), 0.0, (false, 0.1));
            inputs.push(shipment(i as f64));
        }

        let summary = aggregator
            .aggregate(&inputs, &fixed_vectorizer(), &registry)
            .unwrap();

        assert_eq!(summary.total_shipments, 20);
        assert_eq!(summary.predictions.len(), 10);
        assert_eq!(summary.predictions[9].shipment_id, "SH10");
    }

    #[test]
    fn test_percentage_rounded() {
        let registry = ScriptedRegistry::new()
            .on(1.0, (true, 0.6), 1.0 / 3.0, (false, 0.1))
            .on(2.0, (false, 0.2), 0.0, (false, 0.1))
            .on(3.0, (false, 0.2), 0.0, (false, 0.1));
        let inputs = vec![shipment(1.0), shipment(2.0), shipment(3.0)];
        let summary = aggregator()
            .aggregate(&inputs, &fixed_vectorizer(), &registry)
            .unwrap();
        assert_eq!(summary.delay_percentage, 33.33);
        assert_eq!(summary.average_delay_hours, 0.33);
    }
}
