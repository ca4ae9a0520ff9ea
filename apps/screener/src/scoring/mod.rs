//! Weighted scorer: turns per-dimension raw scores into a deterministic overall score.
//!
//! The overall score is always recomputed from raw scores and the weight table
//! in effect for the run. Any total supplied by the scoring oracle is ignored.
//! Weights are never renormalised here; keeping their sum at 1.0 is the caller's job.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::analysis::{ScoreDetail, ScoreDimension};

/// Tolerance used when callers check that a weight table sums to 1.0.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Weight per dimension. Always holds an entry for all ten dimensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScoreWeights(BTreeMap<ScoreDimension, f64>);

impl Default for ScoreWeights {
    fn default() -> Self {
        Self(
            ScoreDimension::ALL
                .iter()
                .map(|d| (*d, d.default_weight()))
                .collect(),
        )
    }
}

impl ScoreWeights {
    /// Defaults with the given per-dimension overrides applied on top.
    pub fn with_overrides(overrides: &BTreeMap<ScoreDimension, f64>) -> Self {
        let mut weights = Self::default();
        for (dimension, weight) in overrides {
            weights.0.insert(*dimension, *weight);
        }
        weights
    }

    pub fn weight(&self, dimension: ScoreDimension) -> f64 {
        self.0
            .get(&dimension)
            .copied()
            .unwrap_or_else(|| dimension.default_weight())
    }

    pub fn sum(&self) -> f64 {
        self.0.values().sum()
    }

    /// Checks the caller-side invariants: every weight in [0,1] and a total of 1.0.
    pub fn validate(&self) -> Result<(), String> {
        if let Some((dimension, weight)) = self.0.iter().find(|(_, w)| !(0.0..=1.0).contains(*w)) {
            return Err(format!(
                "weight for {} must be within [0, 1], got {weight}",
                dimension.as_str()
            ));
        }
        let sum = self.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(format!("weights must sum to 1.0, got {sum:.4}"));
        }
        Ok(())
    }
}

/// Overall score: round(Σ raw_score × weight, 2).
///
/// Recomputes each product from `raw_score` and `weight` instead of reading
/// `weighted_score`, so a detail carrying a stale or inflated product has no effect.
pub fn aggregate(details: &[ScoreDetail]) -> f64 {
    round2(details.iter().map(|d| d.raw_score * d.weight).sum())
}

/// Stamps every detail with the weight table in effect, recomputes its
/// weighted score, and returns the aggregate.
pub fn apply_weights(details: &mut [ScoreDetail], weights: &ScoreWeights) -> f64 {
    for detail in details.iter_mut() {
        detail.weight = weights.weight(detail.dimension);
        detail.weighted_score = detail.raw_score * detail.weight;
    }
    aggregate(details)
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detail(dimension: ScoreDimension, raw_score: f64, weight: f64) -> ScoreDetail {
        ScoreDetail {
            dimension,
            raw_score,
            weight,
            weighted_score: raw_score * weight,
            rationale: String::new(),
            evidence: vec![],
            suggestions: vec![],
        }
    }

    fn full_set(raw: [f64; 10]) -> Vec<ScoreDetail> {
        ScoreDimension::ALL
            .iter()
            .zip(raw)
            .map(|(d, r)| detail(*d, r, d.default_weight()))
            .collect()
    }

    #[test]
    fn test_aggregate_sums_weighted_scores() {
        let details = full_set([9.0, 8.0, 7.0, 6.0, 5.0, 4.0, 3.0, 2.0, 1.0, 0.0]);
        // 2.25 + 1.6 + 1.05 + 0.9 + 0.5 + 0.2 + 0.09 + 0.06 + 0.02 + 0.0
        assert!((aggregate(&details) - 6.67).abs() < 1e-9);
    }

    #[test]
    fn test_aggregate_is_repeatable() {
        let details = full_set([7.3, 6.1, 8.8, 5.5, 9.9, 4.4, 3.3, 2.2, 1.1, 6.6]);
        let first = aggregate(&details);
        for _ in 0..10 {
            assert_eq!(aggregate(&details), first);
        }
    }

    #[test]
    fn test_aggregate_ignores_supplied_weighted_score() {
        let mut details = full_set([5.0; 10]);
        details[0].weighted_score = 100.0;
        assert!((aggregate(&details) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_aggregate_empty_is_zero() {
        assert_eq!(aggregate(&[]), 0.0);
    }

    #[test]
    fn test_perfect_scores_aggregate_to_ten() {
        assert!((aggregate(&full_set([10.0; 10])) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_apply_weights_overwrites_oracle_weights() {
        let mut details = full_set([8.0; 10]);
        for d in details.iter_mut() {
            d.weight = 0.9;
        }
        let overall = apply_weights(&mut details, &ScoreWeights::default());
        assert!((overall - 8.0).abs() < 1e-9);
        assert!((details[0].weight - 0.25).abs() < 1e-12);
        assert!((details[0].weighted_score - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_overrides_merge_over_defaults() {
        let mut overrides = BTreeMap::new();
        overrides.insert(ScoreDimension::SkillMatch, 0.30);
        overrides.insert(ScoreDimension::ExperienceRelevance, 0.15);
        let weights = ScoreWeights::with_overrides(&overrides);

        assert_eq!(weights.weight(ScoreDimension::SkillMatch), 0.30);
        assert_eq!(weights.weight(ScoreDimension::WorkStability), 0.10);
        assert!(weights.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_sum() {
        let mut overrides = BTreeMap::new();
        overrides.insert(ScoreDimension::SkillMatch, 0.5);
        let err = ScoreWeights::with_overrides(&overrides).validate().unwrap_err();
        assert!(err.contains("sum to 1.0"), "{err}");
    }

    #[test]
    fn test_validate_rejects_out_of_range_weight() {
        let mut overrides = BTreeMap::new();
        overrides.insert(ScoreDimension::BonusPoints, -0.1);
        let err = ScoreWeights::with_overrides(&overrides).validate().unwrap_err();
        assert!(err.contains("bonus_points"), "{err}");
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(6.674999), 6.67);
        assert_eq!(round2(6.675001), 6.68);
        assert_eq!(round2(0.0), 0.0);
    }
}
