//! Shipment delay and anomaly insights
//!
//! This crate provides the core functionality for:
//! - Feature vectorization of sparse shipment records
//! - Delay, duration and anomaly inference behind a model registry
//! - Composite risk scoring
//! - Batch aggregation into fleet insights
//! - Health checks and observability

pub mod engine;
pub mod error;
pub mod health;
pub mod insights;
pub mod models;
pub mod observability;
pub mod predictor;

pub use engine::ShipmentPredictor;
pub use error::{InsightsError, Result};
pub use health::{
    Backend, Component, ComponentHealth, ComponentStatus, HealthRegistry, HealthReport,
    ReadinessReport,
};
pub use insights::{InsightsAggregator, InsightsConfig};
pub use models::*;
pub use observability::{InsightsMetrics, StructuredLogger};
pub use predictor::{
    FeatureVectorizer, HeuristicRegistry, ModelMetadata, ModelRegistry, OnnxModelRegistry,
    RiskLevel, RiskScorer, TemporalContext,
};
