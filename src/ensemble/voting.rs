use std::collections::HashMap;

use super::error::EnsembleError;
use super::types::{ModelPrediction, PredictedValue};

/// Outcome of one strategy combination. The orchestrator fills in identity,
/// weights, consensus and cache bookkeeping around this.
#[derive(Debug, Clone)]
pub struct CombinedVote {
    pub prediction: PredictedValue,
    pub confidence: f64,
}

/// Pure combination of per-model predictions plus a weight snapshot into a
/// single vote. Implementations must not depend on prediction arrival order
/// for the chosen value.
pub trait VotingStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn combine(
        &self,
        predictions: &[ModelPrediction],
        weights: &HashMap<String, f64>,
    ) -> Result<CombinedVote, EnsembleError>;
}

/// Resolves a strategy by its configured name. Unknown names fall back to
/// weighted average.
pub fn strategy_from_name(name: &str) -> Box<dyn VotingStrategy> {
    match name {
        "weighted_average" => Box::new(WeightedAverageVoting),
        "majority" => Box::new(MajorityVoting),
        "ranked_choice" => Box::new(RankedChoiceVoting),
        "adaptive" => Box::new(AdaptiveVoting),
        other => {
            tracing::warn!(
                "⚠️  Unknown voting strategy '{}', falling back to weighted_average",
                other
            );
            Box::new(WeightedAverageVoting)
        }
    }
}

/// Missing weights default to an equal 1/N share.
fn weight_of(weights: &HashMap<String, f64>, model_id: &str, total: usize) -> f64 {
    weights
        .get(model_id)
        .copied()
        .unwrap_or(1.0 / total.max(1) as f64)
}

/// Vote totals per value label in first-encounter order, so tie handling is
/// deterministic with respect to the input slice.
fn vote_totals<F>(predictions: &[ModelPrediction], mut vote_weight: F) -> Vec<(String, f64)>
where
    F: FnMut(&ModelPrediction) -> f64,
{
    let mut totals: Vec<(String, f64)> = Vec::new();
    for p in predictions {
        let label = p.prediction.label();
        let w = vote_weight(p);
        match totals.iter_mut().find(|(l, _)| *l == label) {
            Some((_, total)) => *total += w,
            None => totals.push((label, w)),
        }
    }
    totals
}

fn value_for_label<'a>(predictions: &'a [ModelPrediction], label: &str) -> &'a PredictedValue {
    predictions
        .iter()
        .find(|p| p.prediction.label() == label)
        .map(|p| &p.prediction)
        // vote_totals only produces labels present in the slice
        .unwrap_or(&predictions[0].prediction)
}

fn ensure_non_empty(predictions: &[ModelPrediction]) -> Result<(), EnsembleError> {
    if predictions.is_empty() {
        Err(EnsembleError::EmptyPredictionSet)
    } else {
        Ok(())
    }
}

/// Weighted average: numeric predictions dominate when present
/// (`Σ(v·w·c)/Σ(w·c)`); otherwise a confidence-weighted plurality vote over
/// categorical values.
pub struct WeightedAverageVoting;

impl VotingStrategy for WeightedAverageVoting {
    fn name(&self) -> &'static str {
        "weighted_average"
    }

    fn combine(
        &self,
        predictions: &[ModelPrediction],
        weights: &HashMap<String, f64>,
    ) -> Result<CombinedVote, EnsembleError> {
        ensure_non_empty(predictions)?;
        let n = predictions.len();

        let numeric: Vec<&ModelPrediction> = predictions
            .iter()
            .filter(|p| p.prediction.is_numeric())
            .collect();

        if !numeric.is_empty() {
            let mut value_sum = 0.0;
            let mut vote_sum = 0.0;
            let mut weight_sum = 0.0;
            let mut confidence_sum = 0.0;

            for p in &numeric {
                let w = weight_of(weights, &p.model_id, n);
                let vote = w * p.confidence;
                // filter above guarantees a numeric value
                let v = p.prediction.as_numeric().unwrap_or_default();

                value_sum += v * vote;
                vote_sum += vote;
                weight_sum += w;
                confidence_sum += p.confidence * w;
            }

            let final_value = if vote_sum > 0.0 {
                value_sum / vote_sum
            } else {
                // All-zero confidences; fall back to the plain mean.
                numeric
                    .iter()
                    .filter_map(|p| p.prediction.as_numeric())
                    .sum::<f64>()
                    / numeric.len() as f64
            };

            let confidence = if weight_sum > 0.0 {
                (confidence_sum / weight_sum).clamp(0.0, 1.0)
            } else {
                0.0
            };

            return Ok(CombinedVote {
                prediction: PredictedValue::Numeric(final_value),
                confidence,
            });
        }

        // Categorical-only: confidence-weighted plurality.
        let totals = vote_totals(predictions, |p| {
            weight_of(weights, &p.model_id, n) * p.confidence
        });
        let total_weight: f64 = predictions
            .iter()
            .map(|p| weight_of(weights, &p.model_id, n))
            .sum();

        let (winner, max_vote) = totals
            .iter()
            .fold(None::<(&String, f64)>, |best, (label, vote)| match best {
                Some((_, best_vote)) if *vote <= best_vote => best,
                _ => Some((label, *vote)),
            })
            .ok_or(EnsembleError::EmptyPredictionSet)?;

        let confidence = if total_weight > 0.0 {
            (max_vote / total_weight).clamp(0.0, 1.0)
        } else {
            0.0
        };

        Ok(CombinedVote {
            prediction: value_for_label(predictions, winner).clone(),
            confidence,
        })
    }
}

/// Majority: unweighted count of identical predicted values. Ties resolve to
/// the first-encountered value in the input slice.
pub struct MajorityVoting;

impl VotingStrategy for MajorityVoting {
    fn name(&self) -> &'static str {
        "majority"
    }

    fn combine(
        &self,
        predictions: &[ModelPrediction],
        _weights: &HashMap<String, f64>,
    ) -> Result<CombinedVote, EnsembleError> {
        ensure_non_empty(predictions)?;

        let counts = vote_totals(predictions, |_| 1.0);
        let (winner, vote_count) = counts
            .iter()
            .fold(None::<(&String, f64)>, |best, (label, count)| match best {
                Some((_, best_count)) if *count <= best_count => best,
                _ => Some((label, *count)),
            })
            .ok_or(EnsembleError::EmptyPredictionSet)?;

        let winner_confidences: Vec<f64> = predictions
            .iter()
            .filter(|p| p.prediction.label() == *winner)
            .map(|p| p.confidence)
            .collect();

        let mean_confidence =
            winner_confidences.iter().sum::<f64>() / winner_confidences.len() as f64;
        let consensus = vote_count / predictions.len() as f64;

        Ok(CombinedVote {
            prediction: value_for_label(predictions, winner).clone(),
            confidence: (mean_confidence * consensus).clamp(0.0, 1.0),
        })
    }
}

/// Ranked choice, simplified: iteratively eliminates the candidate value with
/// the lowest weighted vote total until one remains. Eliminated votes are not
/// transferred (models report a single value, no ranking), so this is a
/// one-shot low-vote elimination rather than canonical instant-runoff.
pub struct RankedChoiceVoting;

impl VotingStrategy for RankedChoiceVoting {
    fn name(&self) -> &'static str {
        "ranked_choice"
    }

    fn combine(
        &self,
        predictions: &[ModelPrediction],
        weights: &HashMap<String, f64>,
    ) -> Result<CombinedVote, EnsembleError> {
        ensure_non_empty(predictions)?;
        let n = predictions.len();

        // Confidence-ordered view for the audit trail.
        let mut by_confidence: Vec<&ModelPrediction> = predictions.iter().collect();
        by_confidence.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        tracing::debug!(
            "🗳️  Ranked choice field: {:?}",
            by_confidence
                .iter()
                .map(|p| (p.model_id.as_str(), p.confidence))
                .collect::<Vec<_>>()
        );

        let mut live: Vec<String> = Vec::new();
        for p in predictions {
            let label = p.prediction.label();
            if !live.contains(&label) {
                live.push(label);
            }
        }

        while live.len() > 1 {
            let mut totals: Vec<(String, f64)> = live
                .iter()
                .map(|label| {
                    let total = predictions
                        .iter()
                        .filter(|p| p.prediction.label() == *label)
                        .map(|p| weight_of(weights, &p.model_id, n) * p.confidence)
                        .sum::<f64>();
                    (label.clone(), total)
                })
                .collect();

            totals.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
            let eliminated = totals[0].0.clone();
            live.retain(|label| *label != eliminated);
            tracing::debug!("🗳️  Eliminated candidate: {}", eliminated);
        }

        let winner = live.into_iter().next().ok_or(EnsembleError::EmptyPredictionSet)?;

        let winner_confidences: Vec<f64> = predictions
            .iter()
            .filter(|p| p.prediction.label() == winner)
            .map(|p| p.confidence)
            .collect();
        let confidence =
            winner_confidences.iter().sum::<f64>() / winner_confidences.len().max(1) as f64;

        Ok(CombinedVote {
            prediction: value_for_label(predictions, &winner).clone(),
            confidence: confidence.clamp(0.0, 1.0),
        })
    }
}

/// Adaptive: squares each model's confidence into its weight, renormalizes,
/// then combines weighted-average style and discounts the final confidence by
/// an uncertainty score.
pub struct AdaptiveVoting;

impl VotingStrategy for AdaptiveVoting {
    fn name(&self) -> &'static str {
        "adaptive"
    }

    fn combine(
        &self,
        predictions: &[ModelPrediction],
        weights: &HashMap<String, f64>,
    ) -> Result<CombinedVote, EnsembleError> {
        ensure_non_empty(predictions)?;
        let n = predictions.len();

        let mut adaptive: Vec<f64> = predictions
            .iter()
            .map(|p| weight_of(weights, &p.model_id, n) * p.confidence * p.confidence)
            .collect();
        let sum: f64 = adaptive.iter().sum();
        if sum > 0.0 {
            for w in &mut adaptive {
                *w /= sum;
            }
        } else {
            adaptive = vec![1.0 / n as f64; n];
        }

        let numeric_count = predictions.iter().filter(|p| p.prediction.is_numeric()).count();

        if numeric_count * 2 > n {
            // Strict numeric majority: weighted mean over the numeric subset.
            let mut weight_sum = 0.0;
            let mut value_sum = 0.0;
            let mut confidence_sum = 0.0;
            for (p, aw) in predictions.iter().zip(&adaptive) {
                if let Some(v) = p.prediction.as_numeric() {
                    weight_sum += aw;
                    value_sum += v * aw;
                    confidence_sum += p.confidence * aw;
                }
            }

            if weight_sum <= 0.0 {
                // Numeric majority but zero adaptive mass on it; plain mean,
                // no confidence to report.
                let values: Vec<f64> = predictions
                    .iter()
                    .filter_map(|p| p.prediction.as_numeric())
                    .collect();
                let mean = values.iter().sum::<f64>() / values.len() as f64;
                return Ok(CombinedVote {
                    prediction: PredictedValue::Numeric(mean),
                    confidence: 0.0,
                });
            }

            let mean = value_sum / weight_sum;
            let confidence = confidence_sum / weight_sum;

            let variance = predictions
                .iter()
                .zip(&adaptive)
                .filter_map(|(p, aw)| p.prediction.as_numeric().map(|v| (v, aw)))
                .map(|(v, aw)| (aw / weight_sum) * (v - mean).powi(2))
                .sum::<f64>();

            let uncertainty = if mean.abs() < f64::EPSILON {
                if variance < f64::EPSILON {
                    0.0
                } else {
                    1.0
                }
            } else {
                (variance / (mean * mean)).clamp(0.0, 1.0)
            };

            return Ok(CombinedVote {
                prediction: PredictedValue::Numeric(mean),
                confidence: (confidence * (1.0 - uncertainty)).clamp(0.0, 1.0),
            });
        }

        // Categorical path: adaptive-weighted vote; uncertainty is the
        // complement of the winning vote share.
        let mut idx = 0;
        let totals = vote_totals(predictions, |_| {
            let w = adaptive[idx];
            idx += 1;
            w
        });
        let total_votes: f64 = totals.iter().map(|(_, v)| v).sum();

        let (winner, max_vote) = totals
            .iter()
            .fold(None::<(&String, f64)>, |best, (label, vote)| match best {
                Some((_, best_vote)) if *vote <= best_vote => best,
                _ => Some((label, *vote)),
            })
            .ok_or(EnsembleError::EmptyPredictionSet)?;

        let max_share = if total_votes > 0.0 { max_vote / total_votes } else { 0.0 };
        let uncertainty = 1.0 - max_share;

        Ok(CombinedVote {
            prediction: value_for_label(predictions, winner).clone(),
            confidence: (max_share * (1.0 - uncertainty)).clamp(0.0, 1.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ensemble::types::FeatureMap;
    use chrono::Utc;

    fn numeric(id: &str, value: f64, confidence: f64) -> ModelPrediction {
        ModelPrediction {
            model_id: id.to_string(),
            prediction: PredictedValue::Numeric(value),
            confidence,
            features: FeatureMap::new(),
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    fn categorical(id: &str, value: &str, confidence: f64) -> ModelPrediction {
        ModelPrediction {
            model_id: id.to_string(),
            prediction: PredictedValue::Categorical(value.to_string()),
            confidence,
            features: FeatureMap::new(),
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    fn weights(entries: &[(&str, f64)]) -> HashMap<String, f64> {
        entries
            .iter()
            .map(|(id, w)| (id.to_string(), *w))
            .collect()
    }

    #[test]
    fn all_strategies_reject_empty_input() {
        let w = HashMap::new();
        for name in ["weighted_average", "majority", "ranked_choice", "adaptive"] {
            let strategy = strategy_from_name(name);
            let err = strategy.combine(&[], &w).unwrap_err();
            assert!(matches!(err, EnsembleError::EmptyPredictionSet));
        }
    }

    #[test]
    fn unknown_strategy_falls_back_to_weighted_average() {
        let strategy = strategy_from_name("does_not_exist");
        assert_eq!(strategy.name(), "weighted_average");
    }

    #[test]
    fn weighted_average_numeric_pulls_toward_heavier_models() {
        let preds = vec![
            numeric("m1", 10.0, 0.9),
            numeric("m2", 20.0, 0.8),
            numeric("m3", 30.0, 0.5),
        ];
        let w = weights(&[("m1", 0.5), ("m2", 0.3), ("m3", 0.2)]);

        let vote = WeightedAverageVoting.combine(&preds, &w).unwrap();
        let value = vote.prediction.as_numeric().unwrap();
        assert!(value > 10.0 && value < 20.0, "got {}", value);
    }

    #[test]
    fn weighted_average_prefers_numeric_over_categorical() {
        let preds = vec![
            numeric("m1", 100.0, 0.9),
            categorical("m2", "buy", 0.95),
        ];
        let w = weights(&[("m1", 0.5), ("m2", 0.5)]);

        let vote = WeightedAverageVoting.combine(&preds, &w).unwrap();
        assert!(vote.prediction.is_numeric());
    }

    #[test]
    fn weighted_average_categorical_uses_confidence_weighted_plurality() {
        let preds = vec![
            categorical("m1", "buy", 0.9),
            categorical("m2", "sell", 0.4),
            categorical("m3", "sell", 0.3),
        ];
        // Equal 1/3 weights: buy gets 0.3 of a total weight of 1.0.
        let vote = WeightedAverageVoting.combine(&preds, &HashMap::new()).unwrap();
        assert_eq!(vote.prediction.label(), "buy");
        assert!((vote.confidence - 0.3).abs() < 1e-12);
    }

    #[test]
    fn majority_picks_most_common_value() {
        let preds = vec![
            categorical("m1", "buy", 0.8),
            categorical("m2", "buy", 0.7),
            categorical("m3", "sell", 0.9),
        ];
        let vote = MajorityVoting.combine(&preds, &HashMap::new()).unwrap();

        assert_eq!(vote.prediction.label(), "buy");
        // (0.8 + 0.7) / 2 * (2 / 3)
        assert!((vote.confidence - 0.5).abs() < 1e-12);
    }

    #[test]
    fn majority_tie_resolves_to_first_encountered() {
        let preds = vec![
            categorical("m1", "hold", 0.6),
            categorical("m2", "sell", 0.9),
        ];
        let vote = MajorityVoting.combine(&preds, &HashMap::new()).unwrap();
        assert_eq!(vote.prediction.label(), "hold");
    }

    #[test]
    fn ranked_choice_eliminates_lowest_vote_candidate() {
        let preds = vec![
            categorical("m1", "buy", 0.9),
            categorical("m2", "buy", 0.8),
            categorical("m3", "sell", 0.7),
            categorical("m4", "hold", 0.2),
        ];
        let vote = RankedChoiceVoting.combine(&preds, &HashMap::new()).unwrap();

        assert_eq!(vote.prediction.label(), "buy");
        // Mean confidence of the original "buy" predictions.
        assert!((vote.confidence - 0.85).abs() < 1e-12);
    }

    #[test]
    fn ranked_choice_single_candidate_wins_outright() {
        let preds = vec![numeric("m1", 5.0, 0.4), numeric("m2", 5.0, 0.6)];
        let vote = RankedChoiceVoting.combine(&preds, &HashMap::new()).unwrap();
        assert_eq!(vote.prediction.as_numeric(), Some(5.0));
        assert!((vote.confidence - 0.5).abs() < 1e-12);
    }

    #[test]
    fn adaptive_numeric_majority_takes_numeric_path() {
        let preds = vec![
            numeric("m1", 10.0, 0.9),
            numeric("m2", 12.0, 0.8),
            categorical("m3", "buy", 0.7),
        ];
        let vote = AdaptiveVoting.combine(&preds, &HashMap::new()).unwrap();

        let value = vote.prediction.as_numeric().unwrap();
        assert!(value > 10.0 && value < 12.0);
    }

    #[test]
    fn adaptive_agreement_keeps_confidence_high() {
        let agree = vec![numeric("m1", 10.0, 0.9), numeric("m2", 10.0, 0.9)];
        let disagree = vec![numeric("m1", 2.0, 0.9), numeric("m2", 18.0, 0.9)];

        let agree_vote = AdaptiveVoting.combine(&agree, &HashMap::new()).unwrap();
        let disagree_vote = AdaptiveVoting.combine(&disagree, &HashMap::new()).unwrap();

        assert!(agree_vote.confidence > disagree_vote.confidence);
    }

    #[test]
    fn adaptive_categorical_discounts_split_votes() {
        let unanimous = vec![
            categorical("m1", "buy", 0.8),
            categorical("m2", "buy", 0.8),
        ];
        let split = vec![
            categorical("m1", "buy", 0.8),
            categorical("m2", "sell", 0.8),
        ];

        let unanimous_vote = AdaptiveVoting.combine(&unanimous, &HashMap::new()).unwrap();
        let split_vote = AdaptiveVoting.combine(&split, &HashMap::new()).unwrap();

        assert_eq!(unanimous_vote.prediction.label(), "buy");
        assert!(unanimous_vote.confidence > split_vote.confidence);
    }

    #[test]
    fn adaptive_favors_high_confidence_models_quadratically() {
        let preds = vec![numeric("m1", 100.0, 0.9), numeric("m2", 0.0, 0.3)];
        let vote = AdaptiveVoting.combine(&preds, &HashMap::new()).unwrap();

        // 0.81 vs 0.09 adaptive weight: result sits close to m1.
        let value = vote.prediction.as_numeric().unwrap();
        assert!(value > 80.0);
    }
}
