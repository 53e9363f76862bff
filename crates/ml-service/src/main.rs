//! ChainSight ML service
//!
//! Loads the exported delay and anomaly models and serves per-shipment
//! predictions and batch insights over HTTP.

use anyhow::{Context, Result};
use chainsight_core::{
    health::{Backend, Component, HealthRegistry},
    observability::{InsightsMetrics, StructuredLogger},
    predictor::{HeuristicRegistry, ModelRegistry, OnnxModelRegistry, TemporalContext},
    FeatureVectorizer, ShipmentPredictor,
};
use chainsight_ml::{
    api::{self, AppState},
    config::ServiceConfig,
    SERVICE_VERSION,
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting chainsight-ml");

    let config = ServiceConfig::load().context("invalid CHAINSIGHT_* configuration")?;
    info!(
        instance = %config.instance_name,
        port = config.port,
        model_dir = %config.model_dir.display(),
        "Service configured"
    );

    let health_registry = HealthRegistry::new();

    let metrics = InsightsMetrics::new();
    let logger = StructuredLogger::new(&config.instance_name);

    let (registry, backend) = load_registry(&config, &logger)?;
    health_registry.set_backend(backend).await;
    metrics.set_model_version(registry.version(), backend.as_str());

    let vectorizer = FeatureVectorizer::new(TemporalContext::system());
    let predictor = match ShipmentPredictor::new(registry, vectorizer) {
        Ok(p) => p.with_insights_config(config.insights_config()),
        Err(e) => {
            health_registry
                .mark_unhealthy(Component::Scorer, e.to_string())
                .await;
            return Err(e).context("model registry does not match the feature schema");
        }
    };

    logger.log_startup(SERVICE_VERSION, predictor.model_version(), backend.as_str());

    let app_state = Arc::new(AppState::new(
        predictor,
        health_registry.clone(),
        metrics,
        logger.clone(),
    ));

    health_registry.set_ready(true).await;

    let api_handle = tokio::spawn(api::serve(config.port, app_state));

    tokio::select! {
        result = api_handle => {
            match result {
                Ok(Ok(())) => logger.log_shutdown("API server exited"),
                Ok(Err(e)) => {
                    error!(error = %e, "API server failed");
                    return Err(e);
                }
                Err(e) => return Err(e).context("API server task panicked"),
            }
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            logger.log_shutdown("SIGINT received");
        }
    }

    info!("Shutting down");
    Ok(())
}

/// Load the ONNX registry, falling back to heuristics when allowed
fn load_registry(
    config: &ServiceConfig,
    logger: &StructuredLogger,
) -> Result<(Arc<dyn ModelRegistry>, Backend)> {
    let model_dir = config.model_dir.display().to_string();

    match OnnxModelRegistry::load(&config.model_dir) {
        Ok(registry) => {
            logger.log_models_loaded(&model_dir, registry.version());
            Ok((Arc::new(registry), Backend::Onnx))
        }
        Err(e) if config.allow_fallback => {
            logger.log_fallback_activated(&model_dir, &e.to_string());
            Ok((Arc::new(HeuristicRegistry::new()), Backend::Heuristic))
        }
        Err(e) => Err(e).context("failed to load models and fallback is disabled"),
    }
}
