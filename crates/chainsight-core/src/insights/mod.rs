//! Fleet-level insights over scored shipment batches

mod aggregator;
mod trend;

pub use aggregator::{InsightsAggregator, ANOMALY_COUNT_THRESHOLD};
pub use trend::{build_trends, default_trend_baseline};

use crate::models::TrendPoint;

/// Number of results kept in a summary preview, also the largest allowed
pub const DEFAULT_PREVIEW_LIMIT: usize = 10;

/// Aggregation configuration
#[derive(Debug, Clone)]
pub struct InsightsConfig {
    /// Maximum number of per-shipment results in the preview, capped at
    /// [`DEFAULT_PREVIEW_LIMIT`]
    pub preview_limit: usize,
    /// History placed before the live trend bucket
    pub trend_baseline: Vec<TrendPoint>,
}

impl Default for InsightsConfig {
    fn default() -> Self {
        Self {
            preview_limit: DEFAULT_PREVIEW_LIMIT,
            trend_baseline: default_trend_baseline(),
        }
    }
}

impl InsightsConfig {
    /// Preview length actually applied to a batch
    pub fn effective_preview_limit(&self) -> usize {
        self.preview_limit.min(DEFAULT_PREVIEW_LIMIT)
    }
}
