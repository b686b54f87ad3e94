use anyhow::anyhow;
use chrono::Utc;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant as StdInstant;
use tokio::time::{Duration, Instant};
use uuid::Uuid;

use crate::core::EnsembleConfig;

use super::cache::PredictionCache;
use super::consensus::{consensus_score, diversity_score};
use super::error::EnsembleError;
use super::model::Model;
use super::performance::PerformanceTracker;
use super::registry::ModelRegistry;
use super::types::{
    EnsembleFeedback, EnsemblePrediction, FeatureMap, ModelPrediction, PerformanceMetrics,
    PredictedValue,
};
use super::voting::{strategy_from_name, VotingStrategy};

/// Façade over registry, cache, tracker and the configured voting strategy.
///
/// Lock order per request: registry snapshot (released) → model calls with no
/// locks held → cache write. Cache and tracker carry their own independent
/// locks, so a weight update never blocks a concurrent predict.
pub struct EnsembleOrchestrator {
    registry: Arc<ModelRegistry>,
    cache: Arc<PredictionCache>,
    tracker: Arc<PerformanceTracker>,
    strategy: Box<dyn VotingStrategy>,
    config: EnsembleConfig,
}

impl EnsembleOrchestrator {
    pub fn new(config: EnsembleConfig) -> Self {
        let strategy = strategy_from_name(&config.voting_strategy);
        tracing::info!(
            "🧩 Ensemble orchestrator ready (strategy: {}, min models: {}, cache: {} entries / {}s TTL)",
            strategy.name(),
            config.min_models,
            config.cache_size,
            config.cache_ttl_secs
        );

        Self {
            registry: Arc::new(ModelRegistry::new(config.max_models)),
            cache: Arc::new(PredictionCache::new(config.cache_size, config.cache_ttl_secs)),
            tracker: Arc::new(PerformanceTracker::new(config.performance_window)),
            strategy,
            config,
        }
    }

    /// Registers a model and seeds its empty performance history.
    pub async fn add_model(&self, id: &str, model: Arc<dyn Model>) -> Result<(), EnsembleError> {
        self.registry.add_model(id, model).await?;
        self.tracker.ensure_history(id).await;
        Ok(())
    }

    /// Computes one ensemble prediction for the given feature map.
    ///
    /// Idempotent within the cache TTL for logically identical inputs: a hit
    /// returns the original prediction, ID included, without any fan-out.
    pub async fn predict(
        &self,
        features: &FeatureMap,
    ) -> Result<EnsemblePrediction, EnsembleError> {
        let cache_key = PredictionCache::fingerprint(features);
        if let Some(hit) = self.cache.get(&cache_key).await {
            tracing::debug!("⚡ Cache hit for prediction {}", hit.prediction_id);
            return Ok(hit);
        }

        let (models, weights) = self.registry.snapshot().await;
        if models.len() < self.config.min_models {
            return Err(EnsembleError::InsufficientModels {
                registered: models.len(),
                min_models: self.config.min_models,
            });
        }

        let attempted = models.len();
        let (predictions, last_error) = self.fan_out(models, features).await;

        if predictions.len() < self.config.min_models {
            return Err(EnsembleError::InsufficientSuccessfulPredictions {
                succeeded: predictions.len(),
                attempted,
                min_models: self.config.min_models,
                last_error: last_error.unwrap_or_else(|| "no model errors recorded".to_string()),
            });
        }

        let vote = self
            .strategy
            .combine(&predictions, &weights)
            .map_err(|e| match e {
                EnsembleError::EmptyPredictionSet => EnsembleError::EmptyPredictionSet,
                other => EnsembleError::CombinationFailed(other.to_string()),
            })?;

        let consensus = consensus_score(&predictions);
        let model_votes: HashMap<String, ModelPrediction> = predictions
            .iter()
            .map(|p| (p.model_id.clone(), p.clone()))
            .collect();

        let prediction = EnsemblePrediction {
            prediction_id: Uuid::new_v4().to_string(),
            final_prediction: vote.prediction,
            confidence: vote.confidence,
            model_votes,
            weights,
            consensus,
            diversity: diversity_score(consensus),
            timestamp: Utc::now(),
        };

        self.cache.insert(cache_key, prediction.clone()).await;

        if self.config.enable_meta_learning {
            // Context scoring must not delay the response.
            let tracker = self.tracker.clone();
            let context_predictions = predictions.clone();
            let context_features = features.clone();
            tokio::spawn(async move {
                tracker
                    .update_context_scores(&context_predictions, &context_features)
                    .await;
            });
        }

        tracing::info!(
            "🎯 Ensemble prediction {} from {}/{} models (confidence: {:.2}, consensus: {:.2})",
            prediction.prediction_id,
            predictions.len(),
            attempted,
            prediction.confidence,
            prediction.consensus
        );

        Ok(prediction)
    }

    /// Concurrent fan-out: one task per model, all sharing a single request
    /// deadline. A failing or timed-out model forfeits its slot only; the
    /// last error is kept for diagnostics.
    async fn fan_out(
        &self,
        models: HashMap<String, Arc<dyn Model>>,
        features: &FeatureMap,
    ) -> (Vec<ModelPrediction>, Option<String>) {
        let deadline = Instant::now() + Duration::from_secs(self.config.request_timeout_secs);
        let shared_features = Arc::new(features.clone());

        let tasks: Vec<_> = models
            .into_iter()
            .map(|(model_id, model)| {
                let features = shared_features.clone();
                tokio::spawn(async move {
                    let started = StdInstant::now();
                    let outcome = tokio::time::timeout_at(deadline, model.predict(&features))
                        .await
                        .unwrap_or_else(|_| Err(anyhow!("model call exceeded request deadline")));

                    match outcome {
                        Ok(output) => {
                            let mut metadata = output.model_info;
                            metadata.insert(
                                "latency_ms".to_string(),
                                format!("{:.2}", started.elapsed().as_secs_f64() * 1000.0),
                            );
                            Ok(ModelPrediction {
                                model_id,
                                prediction: output.value,
                                confidence: output.confidence.clamp(0.0, 1.0),
                                features: (*features).clone(),
                                timestamp: Utc::now(),
                                metadata,
                            })
                        }
                        Err(e) => Err((model_id, e)),
                    }
                })
            })
            .collect();

        let mut predictions = Vec::new();
        let mut last_error = None;

        for joined in join_all(tasks).await {
            match joined {
                Ok(Ok(prediction)) => predictions.push(prediction),
                Ok(Err((model_id, e))) => {
                    tracing::warn!("⚠️  Model {} failed: {}", model_id, e);
                    last_error = Some(format!("{}: {}", model_id, e));
                }
                Err(e) => {
                    tracing::error!("❌ Model task panicked: {}", e);
                    last_error = Some(format!("task join error: {}", e));
                }
            }
        }

        (predictions, last_error)
    }

    /// Feeds one ground-truth correction into the tracker and rebalances the
    /// weight set across all registered models. Best-effort: always succeeds
    /// once the locks are acquired.
    pub async fn update_weights(&self, feedback: &EnsembleFeedback) -> Result<(), EnsembleError> {
        self.tracker.apply_feedback(feedback).await;

        let raw = self.tracker.compute_raw_weights().await;
        let registered = self.registry.model_ids().await;

        let mut new_weights: HashMap<String, f64> = registered
            .into_iter()
            .map(|id| {
                let weight = raw.get(&id).copied().unwrap_or(0.5);
                (id, weight)
            })
            .collect();

        let total: f64 = new_weights.values().sum();
        if total > 0.0 {
            for weight in new_weights.values_mut() {
                *weight /= total;
            }
        }

        tracing::debug!(
            "⚖️  Weights rebalanced after feedback {}: {:?}",
            feedback.prediction_id,
            new_weights
        );
        self.registry.set_weights(new_weights).await;

        Ok(())
    }

    pub async fn get_performance_metrics(&self) -> PerformanceMetrics {
        let (accuracy, average_error) = self.tracker.aggregate_stats().await;
        PerformanceMetrics {
            total_predictions: self.tracker.total_records().await,
            accuracy,
            average_error,
            model_weights: self.registry.weights().await,
            cache_size: self.cache.len().await,
        }
    }

    /// Builds feedback for a finished prediction once its outcome is known.
    pub fn feedback_for(
        prediction: &EnsemblePrediction,
        actual_outcome: PredictedValue,
        correct: bool,
        error: f64,
    ) -> EnsembleFeedback {
        EnsembleFeedback {
            prediction_id: prediction.prediction_id.clone(),
            prediction: prediction.final_prediction.clone(),
            actual_outcome,
            correct,
            error,
            model_predictions: prediction.model_votes.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ensemble::model::MockModel;

    fn config(min_models: usize, max_models: usize) -> EnsembleConfig {
        EnsembleConfig {
            min_models,
            max_models,
            ..EnsembleConfig::default()
        }
    }

    #[tokio::test]
    async fn predict_fails_below_min_models_without_invoking_any() {
        let orchestrator = EnsembleOrchestrator::new(config(3, 10));

        for id in ["m1", "m2"] {
            let mut model = MockModel::new();
            // Never called: the precondition fails before fan-out.
            model.expect_predict().never();
            orchestrator.add_model(id, Arc::new(model)).await.unwrap();
        }

        let err = orchestrator.predict(&FeatureMap::new()).await.unwrap_err();
        assert!(matches!(
            err,
            EnsembleError::InsufficientModels {
                registered: 2,
                min_models: 3
            }
        ));
    }

    #[tokio::test]
    async fn update_weights_keeps_distribution_normalized() {
        let orchestrator = EnsembleOrchestrator::new(config(2, 10));
        for id in ["m1", "m2", "m3"] {
            orchestrator
                .add_model(id, Arc::new(MockModel::new()))
                .await
                .unwrap();
        }

        let mut model_predictions = HashMap::new();
        for id in ["m1", "m2"] {
            model_predictions.insert(
                id.to_string(),
                ModelPrediction {
                    model_id: id.to_string(),
                    prediction: PredictedValue::Numeric(1.0),
                    confidence: 0.9,
                    features: FeatureMap::new(),
                    timestamp: Utc::now(),
                    metadata: HashMap::new(),
                },
            );
        }
        let feedback = EnsembleFeedback {
            prediction_id: "p1".to_string(),
            prediction: PredictedValue::Numeric(1.0),
            actual_outcome: PredictedValue::Numeric(1.0),
            correct: true,
            error: 0.0,
            model_predictions,
        };

        orchestrator.update_weights(&feedback).await.unwrap();

        let weights = orchestrator.registry.weights().await;
        let total: f64 = weights.values().sum();
        assert_eq!(weights.len(), 3);
        assert!((total - 1.0).abs() < 1e-9);
    }
}
