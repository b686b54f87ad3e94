use thiserror::Error;

/// Typed failures surfaced at the ensemble API boundary.
///
/// Capacity and precondition errors are never retried internally; partial
/// failures below the minimum-success floor carry the last model error for
/// diagnostics.
#[derive(Debug, Error)]
pub enum EnsembleError {
    #[error("model registry full: {max_models} models already registered")]
    CapacityExceeded { max_models: usize },

    #[error("insufficient models registered: {registered} available, {min_models} required")]
    InsufficientModels {
        registered: usize,
        min_models: usize,
    },

    #[error(
        "only {succeeded}/{attempted} models returned predictions ({min_models} required); last error: {last_error}"
    )]
    InsufficientSuccessfulPredictions {
        succeeded: usize,
        attempted: usize,
        min_models: usize,
        last_error: String,
    },

    // Unreachable when the min-models precondition holds; seeing this
    // indicates a bug in the fan-out filter.
    #[error("voting strategy received an empty prediction set")]
    EmptyPredictionSet,

    #[error("prediction combination failed: {0}")]
    CombinationFailed(String),
}
