//! Risk scoring from classifier outputs
//!
//! Two thresholding bases coexist here and are kept separate on purpose:
//! the risk *level* compares each probability on its own against 0.7/0.4,
//! while the risk *score* blends both probabilities. Downstream consumers
//! read each independently.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Weight of the delay probability in the composite score
pub const DELAY_WEIGHT: f64 = 0.6;

/// Weight of the anomaly probability in the composite score
pub const ANOMALY_WEIGHT: f64 = 0.4;

/// A probability strictly above this is high risk
pub const HIGH_PROBABILITY_THRESHOLD: f64 = 0.7;

/// A probability strictly above this is at least medium risk
pub const MEDIUM_PROBABILITY_THRESHOLD: f64 = 0.4;

/// Composite scores at or above this fall in the high band
pub const HIGH_SCORE_THRESHOLD: f64 = 70.0;

/// Composite scores at or above this fall in the medium band
pub const MEDIUM_SCORE_THRESHOLD: f64 = 40.0;

/// Three-tier risk classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Level implied by a single probability
    pub fn from_probability(probability: f64) -> Self {
        if probability > HIGH_PROBABILITY_THRESHOLD {
            RiskLevel::High
        } else if probability > MEDIUM_PROBABILITY_THRESHOLD {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    /// Band of a composite score: low < 40 <= medium < 70 <= high
    pub fn from_score(score: f64) -> Self {
        if score >= HIGH_SCORE_THRESHOLD {
            RiskLevel::High
        } else if score >= MEDIUM_SCORE_THRESHOLD {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for the composite score
#[derive(Debug, Clone)]
pub struct RiskConfig {
    pub delay_weight: f64,
    pub anomaly_weight: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            delay_weight: DELAY_WEIGHT,
            anomaly_weight: ANOMALY_WEIGHT,
        }
    }
}

/// Composes delay and anomaly probabilities into a score and a level
#[derive(Debug, Clone, Default)]
pub struct RiskScorer {
    config: RiskConfig,
}

impl RiskScorer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: RiskConfig) -> Self {
        Self { config }
    }

    /// Returns `(risk_score, risk_level)`
    ///
    /// The score is `(delay * 0.6 + anomaly * 0.4) * 100` clamped to
    /// [0, 100]. The level is high when either probability exceeds 0.7 and
    /// medium when either exceeds 0.4.
    pub fn score(&self, delay_probability: f64, anomaly_probability: f64) -> (f64, RiskLevel) {
        (
            self.composite_score(delay_probability, anomaly_probability),
            self.level(delay_probability, anomaly_probability),
        )
    }

    pub fn composite_score(&self, delay_probability: f64, anomaly_probability: f64) -> f64 {
        let blended = delay_probability * self.config.delay_weight
            + anomaly_probability * self.config.anomaly_weight;
        (blended * 100.0).clamp(0.0, 100.0)
    }

    pub fn level(&self, delay_probability: f64, anomaly_probability: f64) -> RiskLevel {
        RiskLevel::from_probability(delay_probability)
            .max(RiskLevel::from_probability(anomaly_probability))
    }
}
