use std::collections::HashMap;

use super::types::ModelPrediction;

/// Agreement among model outputs for one request, in [0, 1].
///
/// Fewer than 2 predictions: trivial agreement (1.0). Two or more numeric
/// predictions: `max(0, 1 - cv)` where cv is the coefficient of variation of
/// the numeric values. Otherwise (categorical-only or a single numeric among
/// categoricals): vote share of the modal value.
pub fn consensus_score(predictions: &[ModelPrediction]) -> f64 {
    if predictions.len() < 2 {
        return 1.0;
    }

    let numeric: Vec<f64> = predictions
        .iter()
        .filter_map(|p| p.prediction.as_numeric())
        .collect();

    if numeric.len() >= 2 {
        return numeric_consensus(&numeric);
    }

    categorical_consensus(predictions)
}

pub fn diversity_score(consensus: f64) -> f64 {
    1.0 - consensus
}

fn numeric_consensus(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let stddev = variance.sqrt();

    if mean.abs() < f64::EPSILON {
        // Zero mean makes cv undefined; identical values still agree fully.
        return if stddev < f64::EPSILON { 1.0 } else { 0.0 };
    }

    let cv = stddev / mean.abs();
    (1.0 - cv).max(0.0)
}

fn categorical_consensus(predictions: &[ModelPrediction]) -> f64 {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for p in predictions {
        *counts.entry(p.prediction.label()).or_insert(0) += 1;
    }

    let max_count = counts.values().copied().max().unwrap_or(0);
    max_count as f64 / predictions.len() as f64
}
