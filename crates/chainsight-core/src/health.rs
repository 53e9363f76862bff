//! Service health for the liveness and readiness endpoints
//!
//! Tracks which registry backend is answering, the status of each service
//! component and whether startup has completed. Serving from the heuristic
//! registry marks the model registry degraded; the service stays ready.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Registry implementation answering predictions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Trained models loaded from the model directory
    Onnx,
    /// Formula-based fallback
    Heuristic,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Onnx => "onnx",
            Backend::Heuristic => "heuristic",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parts of the service that report health
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    ModelRegistry,
    Scorer,
}

impl Component {
    pub const ALL: [Component; 2] = [Component::ModelRegistry, Component::Scorer];

    pub fn as_str(&self) -> &'static str {
        match self {
            Component::ModelRegistry => "model_registry",
            Component::Scorer => "scorer",
        }
    }
}

/// Ordered from best to worst, so the overall status is the maximum
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl ComponentHealth {
    fn new(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            checked_at: Utc::now(),
        }
    }
}

/// Body of `/healthz`
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<Backend>,
    pub models_loaded: bool,
    pub components: BTreeMap<Component, ComponentHealth>,
}

/// Body of `/readyz`
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessReport {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug)]
struct HealthState {
    backend: Option<Backend>,
    components: BTreeMap<Component, ComponentHealth>,
    ready: bool,
}

/// Shared health state; clones observe the same service
#[derive(Debug, Clone)]
pub struct HealthRegistry {
    state: Arc<RwLock<HealthState>>,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    /// Every component starts healthy, with no backend and not ready
    pub fn new() -> Self {
        let components = Component::ALL
            .iter()
            .map(|c| (*c, ComponentHealth::new(ComponentStatus::Healthy, None)))
            .collect();

        Self {
            state: Arc::new(RwLock::new(HealthState {
                backend: None,
                components,
                ready: false,
            })),
        }
    }

    /// Record the registry backend now serving predictions
    pub async fn set_backend(&self, backend: Backend) {
        let health = match backend {
            Backend::Onnx => ComponentHealth::new(ComponentStatus::Healthy, None),
            Backend::Heuristic => ComponentHealth::new(
                ComponentStatus::Degraded,
                Some("serving heuristic fallback, model artifacts unavailable".to_string()),
            ),
        };

        let mut state = self.state.write().await;
        state.backend = Some(backend);
        state.components.insert(Component::ModelRegistry, health);
    }

    pub async fn backend(&self) -> Option<Backend> {
        self.state.read().await.backend
    }

    /// True when trained models, not the heuristic fallback, are serving
    pub async fn models_loaded(&self) -> bool {
        self.backend().await == Some(Backend::Onnx)
    }

    pub async fn mark_unhealthy(&self, component: Component, message: impl Into<String>) {
        let health = ComponentHealth::new(ComponentStatus::Unhealthy, Some(message.into()));
        self.state.write().await.components.insert(component, health);
    }

    pub async fn set_ready(&self, ready: bool) {
        self.state.write().await.ready = ready;
    }

    pub async fn report(&self) -> HealthReport {
        let state = self.state.read().await;
        let status = state
            .components
            .values()
            .map(|c| c.status)
            .max()
            .unwrap_or(ComponentStatus::Healthy);

        HealthReport {
            status,
            backend: state.backend,
            models_loaded: state.backend == Some(Backend::Onnx),
            components: state.components.clone(),
        }
    }

    pub async fn readiness(&self) -> ReadinessReport {
        let state = self.state.read().await;

        let reason = if !state.ready {
            Some("service not yet initialized".to_string())
        } else {
            state
                .components
                .iter()
                .find(|(_, health)| health.status == ComponentStatus::Unhealthy)
                .map(|(component, health)| {
                    format!(
                        "{} unhealthy: {}",
                        component.as_str(),
                        health.message.as_deref().unwrap_or("no detail")
                    )
                })
        };

        ReadinessReport {
            ready: reason.is_none(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_initial_state() {
        let registry = HealthRegistry::new();
        let report = registry.report().await;

        assert_eq!(report.status, ComponentStatus::Healthy);
        assert_eq!(report.backend, None);
        assert!(!report.models_loaded);
        assert_eq!(report.components.len(), 2);

        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert_eq!(readiness.reason.as_deref(), Some("service not yet initialized"));
    }

    #[tokio::test]
    async fn test_onnx_backend_loads_models() {
        let registry = HealthRegistry::new();
        registry.set_backend(Backend::Onnx).await;

        assert!(registry.models_loaded().await);
        assert_eq!(registry.report().await.status, ComponentStatus::Healthy);
    }

    #[tokio::test]
    async fn test_heuristic_backend_degrades_but_stays_ready() {
        let registry = HealthRegistry::new();
        registry.set_backend(Backend::Heuristic).await;
        registry.set_ready(true).await;

        let report = registry.report().await;
        assert_eq!(report.status, ComponentStatus::Degraded);
        assert_eq!(report.backend, Some(Backend::Heuristic));
        assert!(!report.models_loaded);
        assert!(report.components[&Component::ModelRegistry]
            .message
            .as_deref()
            .unwrap()
            .contains("heuristic"));
        assert!(registry.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_unhealthy_component_blocks_readiness() {
        let registry = HealthRegistry::new();
        registry.set_backend(Backend::Heuristic).await;
        registry.set_ready(true).await;
        registry
            .mark_unhealthy(Component::Scorer, "feature schema mismatch")
            .await;

        assert_eq!(registry.report().await.status, ComponentStatus::Unhealthy);
        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert_eq!(
            readiness.reason.as_deref(),
            Some("scorer unhealthy: feature schema mismatch")
        );
    }

    #[tokio::test]
    async fn test_report_serializes_component_names() {
        let registry = HealthRegistry::new();
        registry.set_backend(Backend::Heuristic).await;

        let json = serde_json::to_value(registry.report().await).unwrap();
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["backend"], "heuristic");
        assert_eq!(json["components"]["model_registry"]["status"], "degraded");
        assert_eq!(json["components"]["scorer"]["status"], "healthy");
    }
}
