//! API client for the ChainSight ML service

use anyhow::{Context, Result};
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use url::Url;

/// Failure reported by the service in its `success: false` envelope
#[derive(Debug, Error)]
#[error("API error ({status}): {message}")]
pub struct ApiError {
    pub status: u16,
    pub message: String,
    pub kind: Option<String>,
}

/// API client for the ML service
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        // Without a trailing slash `join` would replace the last path segment
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let base_url = Url::parse(&normalized).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        Self::decode(response).await
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let (message, kind) = match serde_json::from_str::<ErrorResponse>(&body) {
                Ok(err) => (err.error, err.kind),
                Err(_) => (body, None),
            };
            return Err(ApiError {
                status: status.as_u16(),
                message,
                kind,
            }
            .into());
        }

        response.json().await.context("Failed to parse response")
    }

    pub async fn health(&self) -> Result<HealthInfo> {
        self.get("health").await
    }

    pub async fn model_info(&self) -> Result<ModelInfo> {
        self.get("model/info").await
    }

    pub async fn predict(&self, shipment: &Value) -> Result<PredictionResult> {
        let envelope: PredictionEnvelope<PredictionResult> = self.post("predict", shipment).await?;
        Ok(envelope.prediction)
    }

    pub async fn predict_delay(&self, shipment: &Value) -> Result<DelayPrediction> {
        let envelope: PredictionEnvelope<DelayPrediction> =
            self.post("predict/delay", shipment).await?;
        Ok(envelope.prediction)
    }

    pub async fn predict_anomaly(&self, shipment: &Value) -> Result<AnomalyPrediction> {
        let envelope: PredictionEnvelope<AnomalyPrediction> =
            self.post("predict/anomaly", shipment).await?;
        Ok(envelope.prediction)
    }

    pub async fn insights(&self, shipments: &[Value]) -> Result<InsightsSummary> {
        let body = serde_json::json!({ "shipments": shipments });
        let envelope: InsightsEnvelope = self.post("insights", &body).await?;
        Ok(envelope.insights)
    }
}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthInfo {
    pub status: String,
    pub service: String,
    pub models_loaded: bool,
    #[serde(default)]
    pub model_version: Option<String>,
    #[serde(default)]
    pub backend: Option<String>,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PredictionEnvelope<T> {
    success: bool,
    prediction: T,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct InsightsEnvelope {
    success: bool,
    insights: InsightsSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelayPrediction {
    pub is_delayed: bool,
    pub delay_probability: f64,
    pub estimated_delay_hours: f64,
    pub risk_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyPrediction {
    pub has_anomaly: bool,
    pub anomaly_probability: f64,
    pub risk_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    pub shipment_id: String,
    pub delay_probability: f64,
    pub is_delayed: bool,
    pub estimated_delay_hours: f64,
    pub anomaly_probability: f64,
    pub has_anomaly: bool,
    pub risk_score: f64,
    pub risk_level: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskDistribution {
    pub low: u64,
    pub medium: u64,
    pub high: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendPoint {
    pub week: String,
    pub delayed: u64,
    pub on_time: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightsSummary {
    pub total_shipments: u64,
    pub delayed_shipments: u64,
    pub delay_percentage: f64,
    pub average_delay_hours: f64,
    pub high_risk_shipments: u64,
    pub anomalies_detected: u64,
    #[serde(default)]
    pub risk_distribution: RiskDistribution,
    #[serde(default)]
    pub trends: Vec<TrendPoint>,
    #[serde(default)]
    pub predictions: Vec<PredictionResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub success: bool,
    #[serde(default)]
    pub backend: Option<String>,
    pub metadata: ModelMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub version: String,
    #[serde(default)]
    pub trained_at: Option<String>,
    #[serde(default)]
    pub feature_cols: Vec<String>,
    #[serde(default)]
    pub season_classes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}
