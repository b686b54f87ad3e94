pub mod core;
pub mod ensemble;

pub use ensemble::{
    EnsembleError, EnsembleFeedback, EnsembleOrchestrator, EnsemblePrediction, FeatureMap, Model,
    ModelOutput, ModelPrediction, PerformanceMetrics, PredictedValue,
};
