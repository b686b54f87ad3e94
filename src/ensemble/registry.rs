use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::error::EnsembleError;
use super::model::Model;

/// Holds the registered models and their current influence weights.
///
/// Snapshots are taken under a read lock that is released before any model is
/// invoked, so a slow model never blocks registration or other requests.
pub struct ModelRegistry {
    models: Arc<RwLock<HashMap<String, Arc<dyn Model>>>>,
    weights: Arc<RwLock<HashMap<String, f64>>>,
    max_models: usize,
}

impl ModelRegistry {
    pub fn new(max_models: usize) -> Self {
        Self {
            models: Arc::new(RwLock::new(HashMap::new())),
            weights: Arc::new(RwLock::new(HashMap::new())),
            max_models,
        }
    }

    /// Registers a model under `id` with an initial weight of 1/(n+1).
    ///
    /// No de-registration path exists; models live as long as the registry.
    pub async fn add_model(&self, id: &str, model: Arc<dyn Model>) -> Result<(), EnsembleError> {
        let mut models = self.models.write().await;
        if models.len() >= self.max_models {
            return Err(EnsembleError::CapacityExceeded {
                max_models: self.max_models,
            });
        }

        let initial_weight = 1.0 / (models.len() as f64 + 1.0);
        models.insert(id.to_string(), model);

        let mut weights = self.weights.write().await;
        weights.insert(id.to_string(), initial_weight);

        tracing::info!(
            "📦 Model registered: {} (initial weight: {:.3}, {} total)",
            id,
            initial_weight,
            models.len()
        );

        Ok(())
    }

    /// Point-in-time copy of models and weights for one fan-out. The locks
    /// are held only while cloning the maps.
    pub async fn snapshot(&self) -> (HashMap<String, Arc<dyn Model>>, HashMap<String, f64>) {
        let models = self.models.read().await.clone();
        let weights = self.weights.read().await.clone();
        (models, weights)
    }

    pub async fn weights(&self) -> HashMap<String, f64> {
        self.weights.read().await.clone()
    }

    /// Replaces the full weight set after recalculation.
    pub async fn set_weights(&self, new_weights: HashMap<String, f64>) {
        let mut weights = self.weights.write().await;
        *weights = new_weights;
    }

    pub async fn model_count(&self) -> usize {
        self.models.read().await.len()
    }

    pub async fn model_ids(&self) -> Vec<String> {
        self.models.read().await.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ensemble::model::MockModel;

    #[tokio::test]
    async fn add_model_assigns_diminishing_initial_weights() {
        let registry = ModelRegistry::new(5);

        registry
            .add_model("m1", Arc::new(MockModel::new()))
            .await
            .unwrap();
        registry
            .add_model("m2", Arc::new(MockModel::new()))
            .await
            .unwrap();
        registry
            .add_model("m3", Arc::new(MockModel::new()))
            .await
            .unwrap();

        let weights = registry.weights().await;
        assert_eq!(weights["m1"], 1.0);
        assert_eq!(weights["m2"], 0.5);
        assert!((weights["m3"] - 1.0 / 3.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn add_model_rejects_beyond_capacity() {
        let registry = ModelRegistry::new(2);

        registry
            .add_model("m1", Arc::new(MockModel::new()))
            .await
            .unwrap();
        registry
            .add_model("m2", Arc::new(MockModel::new()))
            .await
            .unwrap();

        let err = registry
            .add_model("m3", Arc::new(MockModel::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, EnsembleError::CapacityExceeded { max_models: 2 }));
        assert_eq!(registry.model_count().await, 2);
    }

    #[tokio::test]
    async fn snapshot_is_a_point_in_time_copy() {
        let registry = ModelRegistry::new(5);
        registry
            .add_model("m1", Arc::new(MockModel::new()))
            .await
            .unwrap();

        let (models, weights) = registry.snapshot().await;
        registry
            .add_model("m2", Arc::new(MockModel::new()))
            .await
            .unwrap();

        assert_eq!(models.len(), 1);
        assert_eq!(weights.len(), 1);
        assert_eq!(registry.model_count().await, 2);
    }
}
