use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::types::{EnsembleFeedback, FeatureMap, ModelPrediction};

/// EMA smoothing factor for recent accuracy and context scores.
const SMOOTHING_ALPHA: f64 = 0.1;
/// Pre-normalization weight floor; no model's influence ever reaches zero.
const WEIGHT_FLOOR: f64 = 0.1;
/// Recent accuracy assumed for a model with no feedback yet.
const DEFAULT_ACCURACY: f64 = 0.5;

/// Per-model feedback history: bounded FIFO accuracy window plus
/// exponentially smoothed context-feature scores.
#[derive(Debug, Clone)]
pub struct ModelPerformanceHistory {
    pub accuracy_history: VecDeque<f64>,
    pub context_scores: HashMap<String, f64>,
    pub last_updated: DateTime<Utc>,
}

impl ModelPerformanceHistory {
    fn new() -> Self {
        Self {
            accuracy_history: VecDeque::new(),
            context_scores: HashMap::new(),
            last_updated: Utc::now(),
        }
    }

    /// EMA over the retained history, seeded by the oldest sample.
    fn recent_accuracy(&self) -> f64 {
        let mut samples = self.accuracy_history.iter();
        let Some(first) = samples.next() else {
            return DEFAULT_ACCURACY;
        };

        let mut ema = *first;
        for sample in samples {
            ema = SMOOTHING_ALPHA * sample + (1.0 - SMOOTHING_ALPHA) * ema;
        }
        ema
    }
}

/// One global log entry per consumed feedback event, for aggregate reporting.
#[derive(Debug, Clone)]
pub struct EnsemblePredictionRecord {
    pub correct: bool,
    pub error: f64,
    pub timestamp: DateTime<Utc>,
}

/// Tracks per-model accuracy and recomputes weights from feedback.
pub struct PerformanceTracker {
    histories: Arc<RwLock<HashMap<String, ModelPerformanceHistory>>>,
    records: Arc<RwLock<Vec<EnsemblePredictionRecord>>>,
    history_cap: usize,
}

impl PerformanceTracker {
    pub fn new(history_cap: usize) -> Self {
        Self {
            histories: Arc::new(RwLock::new(HashMap::new())),
            records: Arc::new(RwLock::new(Vec::new())),
            history_cap,
        }
    }

    /// Creates an empty history for a newly registered model. Histories are
    /// never deleted while the model stays registered.
    pub async fn ensure_history(&self, model_id: &str) {
        let mut histories = self.histories.write().await;
        histories
            .entry(model_id.to_string())
            .or_insert_with(ModelPerformanceHistory::new);
    }

    /// Appends a binary accuracy sample for every model that contributed to
    /// the corrected prediction, plus a global record of the outcome.
    pub async fn apply_feedback(&self, feedback: &EnsembleFeedback) {
        let sample = if feedback.correct { 1.0 } else { 0.0 };
        let now = Utc::now();

        let mut histories = self.histories.write().await;
        for model_id in feedback.model_predictions.keys() {
            let history = histories
                .entry(model_id.clone())
                .or_insert_with(ModelPerformanceHistory::new);

            history.accuracy_history.push_back(sample);
            while history.accuracy_history.len() > self.history_cap {
                history.accuracy_history.pop_front();
            }
            history.last_updated = now;
        }
        drop(histories);

        let mut records = self.records.write().await;
        records.push(EnsemblePredictionRecord {
            correct: feedback.correct,
            error: feedback.error,
            timestamp: now,
        });
    }

    /// Raw (pre-normalization) weights: `max(0.1, recent accuracy)` per
    /// tracked model. Normalization across the registered set happens at the
    /// orchestrator, which owns the registry write.
    pub async fn compute_raw_weights(&self) -> HashMap<String, f64> {
        let histories = self.histories.read().await;
        histories
            .iter()
            .map(|(id, history)| (id.clone(), history.recent_accuracy().max(WEIGHT_FLOOR)))
            .collect()
    }

    /// Meta-learning side path: smooths a per-feature context score from the
    /// confidences models reported for this feature set.
    pub async fn update_context_scores(
        &self,
        predictions: &[ModelPrediction],
        features: &FeatureMap,
    ) {
        let mut histories = self.histories.write().await;
        for prediction in predictions {
            let Some(history) = histories.get_mut(&prediction.model_id) else {
                continue;
            };

            for feature_key in features.keys() {
                let score = history
                    .context_scores
                    .entry(feature_key.clone())
                    .or_insert(prediction.confidence);
                *score = SMOOTHING_ALPHA * prediction.confidence + (1.0 - SMOOTHING_ALPHA) * *score;
            }
            history.last_updated = Utc::now();
        }
    }

    pub async fn total_records(&self) -> usize {
        self.records.read().await.len()
    }

    /// Aggregate accuracy and mean absolute error over the full record log.
    pub async fn aggregate_stats(&self) -> (f64, f64) {
        let records = self.records.read().await;
        if records.is_empty() {
            return (0.0, 0.0);
        }

        let n = records.len() as f64;
        let correct = records.iter().filter(|r| r.correct).count() as f64;
        let error_sum: f64 = records.iter().map(|r| r.error.abs()).sum();
        (correct / n, error_sum / n)
    }

    #[cfg(test)]
    pub async fn history_len(&self, model_id: &str) -> usize {
        self.histories
            .read()
            .await
            .get(model_id)
            .map(|h| h.accuracy_history.len())
            .unwrap_or(0)
    }

    #[cfg(test)]
    pub async fn context_score(&self, model_id: &str, feature: &str) -> Option<f64> {
        self.histories
            .read()
            .await
            .get(model_id)
            .and_then(|h| h.context_scores.get(feature).copied())
    }
}
