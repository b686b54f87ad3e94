pub mod cache;
pub mod consensus;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod performance;
pub mod registry;
pub mod types;
pub mod voting;

pub use cache::PredictionCache;
pub use error::EnsembleError;
pub use model::{Model, ModelOutput};
pub use orchestrator::EnsembleOrchestrator;
pub use performance::PerformanceTracker;
pub use registry::ModelRegistry;
pub use types::{
    EnsembleFeedback, EnsemblePrediction, FeatureMap, ModelPrediction, PerformanceMetrics,
    PredictedValue,
};
pub use voting::{strategy_from_name, VotingStrategy};
