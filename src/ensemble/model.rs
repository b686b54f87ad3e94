use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;

use super::types::{FeatureMap, PredictedValue};

/// What a model hands back for one request.
#[derive(Debug, Clone)]
pub struct ModelOutput {
    pub value: PredictedValue,
    /// Model's own confidence in [0, 1].
    pub confidence: f64,
    /// Free-form model info (version, etc.) merged into prediction metadata.
    pub model_info: HashMap<String, String>,
}

impl ModelOutput {
    pub fn new(value: PredictedValue, confidence: f64) -> Self {
        Self {
            value,
            confidence: confidence.clamp(0.0, 1.0),
            model_info: HashMap::new(),
        }
    }

    pub fn with_info(mut self, key: &str, value: &str) -> Self {
        self.model_info.insert(key.to_string(), value.to_string());
        self
    }
}

/// An opaque predictive capability. Implementations must be cancellation-safe:
/// the orchestrator drops in-flight calls when the request deadline passes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Model: Send + Sync {
    async fn predict(&self, features: &FeatureMap) -> Result<ModelOutput>;
}
