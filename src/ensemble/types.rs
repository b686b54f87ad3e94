use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Input feature map. Values stay dynamically typed; numeric vs. categorical
/// is discovered per prediction, not declared up front.
pub type FeatureMap = HashMap<String, serde_json::Value>;

/// A model's predicted value, numeric or categorical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PredictedValue {
    Numeric(f64),
    Categorical(String),
}

impl PredictedValue {
    pub fn as_numeric(&self) -> Option<f64> {
        match self {
            PredictedValue::Numeric(v) => Some(*v),
            PredictedValue::Categorical(_) => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, PredictedValue::Numeric(_))
    }

    /// Canonical string form used as a vote-bucket key. Numeric values with
    /// identical formatting land in the same bucket.
    pub fn label(&self) -> String {
        match self {
            PredictedValue::Numeric(v) => format!("{}", v),
            PredictedValue::Categorical(s) => s.clone(),
        }
    }
}

/// One model's raw output for one request, created per fan-out call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPrediction {
    pub model_id: String,
    pub prediction: PredictedValue,
    pub confidence: f64,
    pub features: FeatureMap,
    pub timestamp: DateTime<Utc>,
    pub metadata: HashMap<String, String>,
}

/// The aggregation result. Immutable once built; cached by feature
/// fingerprint. Invariant: consensus + diversity == 1.0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsemblePrediction {
    pub prediction_id: String,
    pub final_prediction: PredictedValue,
    pub confidence: f64,
    pub model_votes: HashMap<String, ModelPrediction>,
    pub weights: HashMap<String, f64>,
    pub consensus: f64,
    pub diversity: f64,
    pub timestamp: DateTime<Utc>,
}

/// Ground-truth correction for one past ensemble prediction. Consumed
/// exactly once by weight recalculation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleFeedback {
    pub prediction_id: String,
    pub prediction: PredictedValue,
    pub actual_outcome: PredictedValue,
    pub correct: bool,
    pub error: f64,
    pub model_predictions: HashMap<String, ModelPrediction>,
}

/// Aggregate reporting snapshot returned by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_predictions: usize,
    pub accuracy: f64,
    pub average_error: f64,
    pub model_weights: HashMap<String, f64>,
    pub cache_size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicted_value_numeric_accessor() {
        assert_eq!(PredictedValue::Numeric(1.5).as_numeric(), Some(1.5));
        assert_eq!(
            PredictedValue::Categorical("buy".to_string()).as_numeric(),
            None
        );
    }

    #[test]
    fn labels_bucket_identical_values() {
        assert_eq!(
            PredictedValue::Numeric(2.0).label(),
            PredictedValue::Numeric(2.0).label()
        );
        assert_eq!(PredictedValue::Categorical("sell".to_string()).label(), "sell");
    }

    #[test]
    fn predicted_value_serializes_untagged() {
        let n = serde_json::to_value(PredictedValue::Numeric(3.0)).unwrap();
        assert!(n.is_number());
        let c = serde_json::to_value(PredictedValue::Categorical("hold".to_string())).unwrap();
        assert!(c.is_string());
    }
}
