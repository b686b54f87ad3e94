use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

use ensemble_engine::core::{self, Config};
use ensemble_engine::{
    EnsembleOrchestrator, FeatureMap, Model, ModelOutput, PredictedValue,
};

/// Demo model: predicts the mean of the numeric features, scaled by a bias.
struct TrendModel {
    bias: f64,
    confidence: f64,
}

#[async_trait]
impl Model for TrendModel {
    async fn predict(&self, features: &FeatureMap) -> Result<ModelOutput> {
        let numeric: Vec<f64> = features.values().filter_map(|v| v.as_f64()).collect();
        if numeric.is_empty() {
            anyhow::bail!("no numeric features to extrapolate from");
        }

        let mean = numeric.iter().sum::<f64>() / numeric.len() as f64;
        Ok(
            ModelOutput::new(PredictedValue::Numeric(mean * self.bias), self.confidence)
                .with_info("version", "trend-0.1"),
        )
    }
}

/// Demo model: calls a direction from a single momentum feature.
struct DirectionModel {
    threshold: f64,
}

#[async_trait]
impl Model for DirectionModel {
    async fn predict(&self, features: &FeatureMap) -> Result<ModelOutput> {
        let momentum = features
            .get("momentum")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0);

        let direction = if momentum > self.threshold { "up" } else { "down" };
        let confidence = (momentum.abs() * 4.0).clamp(0.1, 0.95);

        Ok(
            ModelOutput::new(PredictedValue::Categorical(direction.to_string()), confidence)
                .with_info("version", "direction-0.1"),
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    core::logging::init_logging(&config.monitoring.log_level);

    tracing::info!("🚀 Ensemble Prediction Engine starting...");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Voting strategy: {}", config.ensemble.voting_strategy);

    let orchestrator = Arc::new(EnsembleOrchestrator::new(config.ensemble.clone()));

    orchestrator
        .add_model(
            "trend_fast",
            Arc::new(TrendModel {
                bias: 1.02,
                confidence: 0.85,
            }),
        )
        .await?;
    orchestrator
        .add_model(
            "trend_slow",
            Arc::new(TrendModel {
                bias: 0.99,
                confidence: 0.7,
            }),
        )
        .await?;
    orchestrator
        .add_model("direction", Arc::new(DirectionModel { threshold: 0.0 }))
        .await?;

    tracing::info!("✅ Demo models registered");

    let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(10));
    let mut tick: u64 = 0;

    loop {
        interval.tick().await;
        tick += 1;

        let mut features: FeatureMap = HashMap::new();
        features.insert("price".to_string(), json!(100.0 + (tick % 20) as f64));
        features.insert("volume".to_string(), json!(50.0 + (tick % 7) as f64 * 3.0));
        features.insert(
            "momentum".to_string(),
            json!(((tick % 10) as f64 - 5.0) / 10.0),
        );

        match orchestrator.predict(&features).await {
            Ok(prediction) => {
                tracing::info!(
                    "📈 {} -> {:?} (confidence: {:.2}, diversity: {:.2})",
                    prediction.prediction_id,
                    prediction.final_prediction,
                    prediction.confidence,
                    prediction.diversity
                );

                // Synthetic outcome for the demo loop: alternate hits and misses.
                let correct = tick % 3 != 0;
                let feedback = EnsembleOrchestrator::feedback_for(
                    &prediction,
                    prediction.final_prediction.clone(),
                    correct,
                    if correct { 0.05 } else { 0.4 },
                );
                if let Err(e) = orchestrator.update_weights(&feedback).await {
                    tracing::error!("❌ Weight update failed: {}", e);
                }
            }
            Err(e) => {
                tracing::error!("❌ Prediction failed: {}", e);
            }
        }

        if tick % 6 == 0 {
            let metrics = orchestrator.get_performance_metrics().await;
            tracing::info!(
                "📊 Metrics: {} predictions, accuracy {:.2}, avg error {:.3}, cache {} entries",
                metrics.total_predictions,
                metrics.accuracy,
                metrics.average_error,
                metrics.cache_size
            );
        }
    }
}
