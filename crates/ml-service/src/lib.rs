//! HTTP service exposing shipment delay and anomaly insights

pub mod api;
pub mod config;

/// Service version reported at startup and by `/health`
pub const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name reported by `/health`
pub const SERVICE_NAME: &str = "ChainSight ML Service";
