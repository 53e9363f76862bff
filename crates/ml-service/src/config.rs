//! Service configuration

use anyhow::Result;
use chainsight_core::insights::{default_trend_baseline, InsightsConfig, DEFAULT_PREVIEW_LIMIT};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

/// Environment variable prefix, e.g. `CHAINSIGHT_PORT`
pub const ENV_PREFIX: &str = "CHAINSIGHT";

/// Service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Instance name attached to structured log events
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    /// HTTP listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory holding the ONNX models and `metadata.json`
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,

    /// Serve heuristic predictions when the models cannot be loaded
    #[serde(default = "default_allow_fallback")]
    pub allow_fallback: bool,

    /// Results kept in the `/insights` preview, 1 to 10
    #[serde(default = "default_preview_limit")]
    pub preview_limit: usize,
}

fn default_instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string())
}

fn default_port() -> u16 {
    5000
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_allow_fallback() -> bool {
    true
}

fn default_preview_limit() -> usize {
    DEFAULT_PREVIEW_LIMIT
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            instance_name: default_instance_name(),
            port: default_port(),
            model_dir: default_model_dir(),
            allow_fallback: default_allow_fallback(),
            preview_limit: default_preview_limit(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from `CHAINSIGHT_*` environment variables
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration from an explicit variable map instead of the
    /// process environment
    pub fn load_from(vars: Option<HashMap<String, String>>) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .source(vars),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.preview_limit == 0 || self.preview_limit > DEFAULT_PREVIEW_LIMIT {
            anyhow::bail!(
                "{}_PREVIEW_LIMIT must be between 1 and {}, got {}",
                ENV_PREFIX,
                DEFAULT_PREVIEW_LIMIT,
                self.preview_limit
            );
        }
        Ok(())
    }

    pub fn insights_config(&self) -> InsightsConfig {
        InsightsConfig {
            preview_limit: self.preview_limit,
            trend_baseline: default_trend_baseline(),
        }
    }
}
