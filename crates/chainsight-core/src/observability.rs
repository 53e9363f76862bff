//! Observability for the insights service
//!
//! Provides:
//! - Prometheus metrics (prediction and batch latency, outcome counters, model version)
//! - Structured JSON logging with tracing

use crate::models::InsightsSummary;
use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, register_int_counter_vec,
    register_int_gauge, GaugeVec, Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Latency buckets for single predictions (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// Latency buckets for whole batches (in seconds)
const BATCH_LATENCY_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<InsightsMetricsInner> = OnceLock::new();

struct InsightsMetricsInner {
    prediction_latency_seconds: Histogram,
    batch_latency_seconds: Histogram,
    last_batch_size: IntGauge,
    model_version_info: GaugeVec,
    predictions_total: IntCounter,
    delayed_total: IntCounter,
    anomalies_total: IntCounter,
    high_risk_total: IntCounter,
    prediction_errors: IntCounterVec,
    inferences_total: IntCounterVec,
    slow_inferences_total: IntCounterVec,
}

impl InsightsMetricsInner {
    fn new() -> Self {
        Self {
            prediction_latency_seconds: register_histogram!(
                "chainsight_prediction_latency_seconds",
                "Time spent scoring a single shipment",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register prediction_latency_seconds"),

            batch_latency_seconds: register_histogram!(
                "chainsight_batch_latency_seconds",
                "Time spent aggregating a shipment batch",
                BATCH_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register batch_latency_seconds"),

            last_batch_size: register_int_gauge!(
                "chainsight_last_batch_size",
                "Number of shipments in the most recent insights batch"
            )
            .expect("Failed to register last_batch_size"),

            model_version_info: register_gauge_vec!(
                "chainsight_model_version_info",
                "Information about the model registry serving predictions",
                &["version", "backend"]
            )
            .expect("Failed to register model_version_info"),

            predictions_total: register_int_counter!(
                "chainsight_predictions_total",
                "Total number of shipments scored"
            )
            .expect("Failed to register predictions_total"),

            delayed_total: register_int_counter!(
                "chainsight_delayed_predictions_total",
                "Total number of shipments classified as delayed"
            )
            .expect("Failed to register delayed_predictions_total"),

            anomalies_total: register_int_counter!(
                "chainsight_anomalies_detected_total",
                "Total number of shipments counted as anomalies"
            )
            .expect("Failed to register anomalies_detected_total"),

            high_risk_total: register_int_counter!(
                "chainsight_high_risk_shipments_total",
                "Total number of high-risk shipments"
            )
            .expect("Failed to register high_risk_shipments_total"),

            prediction_errors: register_int_counter_vec!(
                "chainsight_prediction_errors_total",
                "Total number of failed prediction calls by error kind",
                &["kind"]
            )
            .expect("Failed to register prediction_errors_total"),

            inferences_total: register_int_counter_vec!(
                "chainsight_inferences_total",
                "Total number of ONNX model invocations by capability",
                &["capability"]
            )
            .expect("Failed to register inferences_total"),

            slow_inferences_total: register_int_counter_vec!(
                "chainsight_slow_inferences_total",
                "ONNX model invocations over the latency target by capability",
                &["capability"]
            )
            .expect("Failed to register slow_inferences_total"),
        }
    }
}

/// Insights metrics for Prometheus exposition
///
/// A lightweight handle to the global metrics instance.
/// Clones share the same underlying metrics.
#[derive(Clone)]
pub struct InsightsMetrics {
    _private: (),
}

impl Default for InsightsMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InsightsMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InsightsMetrics").finish_non_exhaustive()
    }
}

impl InsightsMetrics {
    /// Create a metrics handle, registering the global metrics on first use
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(InsightsMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &InsightsMetricsInner {
        GLOBAL_METRICS.get_or_init(InsightsMetricsInner::new)
    }

    pub fn observe_prediction_latency(&self, duration_secs: f64) {
        self.inner().prediction_latency_seconds.observe(duration_secs);
    }

    pub fn observe_batch_latency(&self, duration_secs: f64) {
        self.inner().batch_latency_seconds.observe(duration_secs);
    }

    /// Update model version info
    pub fn set_model_version(&self, version: &str, backend: &str) {
        self.inner().model_version_info.reset();
        self.inner()
            .model_version_info
            .with_label_values(&[version, backend])
            .set(1.0);
    }

    /// Count one scored shipment
    pub fn record_prediction(&self, delayed: bool, anomaly: bool, high_risk: bool) {
        let inner = self.inner();
        inner.predictions_total.inc();
        if delayed {
            inner.delayed_total.inc();
        }
        if anomaly {
            inner.anomalies_total.inc();
        }
        if high_risk {
            inner.high_risk_total.inc();
        }
    }

    /// Count every shipment of an aggregated batch
    pub fn record_batch(&self, summary: &InsightsSummary) {
        let inner = self.inner();
        inner.last_batch_size.set(summary.total_shipments as i64);
        inner.predictions_total.inc_by(summary.total_shipments as u64);
        inner.delayed_total.inc_by(summary.delayed_shipments as u64);
        inner.anomalies_total.inc_by(summary.anomalies_detected as u64);
        inner.high_risk_total.inc_by(summary.high_risk_shipments as u64);
    }

    pub fn inc_prediction_errors(&self, kind: &str) {
        self.inner().prediction_errors.with_label_values(&[kind]).inc();
    }

    pub fn prediction_errors(&self, kind: &str) -> u64 {
        self.inner().prediction_errors.with_label_values(&[kind]).get()
    }

    pub fn predictions_total(&self) -> u64 {
        self.inner().predictions_total.get()
    }

    /// Count one model invocation
    pub fn record_inference(&self, capability: &str, slow: bool) {
        let inner = self.inner();
        inner.inferences_total.with_label_values(&[capability]).inc();
        if slow {
            inner
                .slow_inferences_total
                .with_label_values(&[capability])
                .inc();
        }
    }

    pub fn inferences(&self, capability: &str) -> u64 {
        self.inner()
            .inferences_total
            .with_label_values(&[capability])
            .get()
    }

    pub fn slow_inferences(&self, capability: &str) -> u64 {
        self.inner()
            .slow_inferences_total
            .with_label_values(&[capability])
            .get()
    }
}

/// Structured logger for service events
///
/// Emits consistent `event = "..."` records for lifecycle, model loading,
/// and scoring outcomes.
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn log_startup(&self, version: &str, model_version: &str, backend: &str) {
        info!(
            event = "service_started",
            instance = %self.instance,
            service_version = %version,
            model_version = %model_version,
            backend = %backend,
            "Shipment insights service started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "service_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Shipment insights service shutting down"
        );
    }

    pub fn log_models_loaded(&self, model_dir: &str, model_version: &str) {
        info!(
            event = "models_loaded",
            instance = %self.instance,
            model_dir = %model_dir,
            model_version = %model_version,
            "ONNX models loaded"
        );
    }

    /// Log that the heuristic registry replaced the ONNX models
    pub fn log_fallback_activated(&self, model_dir: &str, reason: &str) {
        warn!(
            event = "fallback_activated",
            instance = %self.instance,
            model_dir = %model_dir,
            reason = %reason,
            "Serving heuristic predictions, model artifacts unavailable"
        );
    }

    pub fn log_prediction(
        &self,
        shipment_id: &str,
        delay_probability: f64,
        anomaly_probability: f64,
        risk_score: f64,
        risk_level: &str,
        model_version: &str,
    ) {
        info!(
            event = "prediction_generated",
            instance = %self.instance,
            shipment_id = %shipment_id,
            delay_probability = delay_probability,
            anomaly_probability = anomaly_probability,
            risk_score = risk_score,
            risk_level = %risk_level,
            model_version = %model_version,
            "Scored shipment"
        );
    }

    pub fn log_batch_summary(&self, summary: &InsightsSummary, elapsed_ms: u128) {
        info!(
            event = "batch_aggregated",
            instance = %self.instance,
            total_shipments = summary.total_shipments,
            delayed_shipments = summary.delayed_shipments,
            delay_percentage = summary.delay_percentage,
            high_risk_shipments = summary.high_risk_shipments,
            anomalies_detected = summary.anomalies_detected,
            elapsed_ms = elapsed_ms as u64,
            "Aggregated shipment insights"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insights_metrics_creation() {
        // The Prometheus registry is process-global; repeated handles share it.
        let metrics = InsightsMetrics::new();
        let again = InsightsMetrics::new();

        metrics.observe_prediction_latency(0.001);
        metrics.observe_batch_latency(0.02);
        metrics.set_model_version("1.0.0", "onnx");

        let before = again.predictions_total();
        metrics.record_prediction(true, false, true);
        assert!(again.predictions_total() > before);
    }

    #[test]
    fn test_error_counter_by_kind() {
        let metrics = InsightsMetrics::new();
        let before = metrics.prediction_errors("schema_error");
        metrics.inc_prediction_errors("schema_error");
        assert!(metrics.prediction_errors("schema_error") > before);
    }

    #[test]
    fn test_batch_counts() {
        let metrics = InsightsMetrics::new();
        let before = metrics.predictions_total();
        metrics.record_batch(&InsightsSummary {
            total_shipments: 4,
            delayed_shipments: 1,
            ..Default::default()
        });
        assert!(metrics.predictions_total() >= before + 4);
    }

    #[test]
    fn test_inference_counters() {
        let metrics = InsightsMetrics::new();
        let capability = "classify_anomaly";
        let total = metrics.inferences(capability);
        let slow = metrics.slow_inferences(capability);

        metrics.record_inference(capability, false);
        metrics.record_inference(capability, true);

        assert!(metrics.inferences(capability) >= total + 2);
        assert!(metrics.slow_inferences(capability) > slow);
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("test-instance");
        assert_eq!(logger.instance(), "test-instance");
    }
}
