//! Per-feature value normalization with an extensible custom transform.

use std::collections::HashMap;

use float_cmp::approx_eq;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::expr::{Bindings, CompiledExpression};
use crate::stats::{ColumnStats, DatasetStatistics, FeatureVector};

/// How a single feature's values are transformed.
///
/// A `Custom` expression must pass [`crate::expr::validate_expression`]
/// before being stored in a spec; an expression that nevertheless fails at
/// evaluation time degrades to the identity transform rather than
/// propagating a fault into the analysis pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NormalizationSpec {
    /// Identity.
    None,
    /// `(v - min) / (max - min)`, 0.0 when the range is zero.
    MinMax,
    /// `(v - mean) / std`, 0.0 when the deviation is zero.
    ZScore,
    /// A user-authored expression over `{x, min, max, mean, std}`.
    Custom(String),
}

/// Dataset-wide normalization selection.
///
/// Either one spec applies to every feature, or each feature resolves its
/// own spec by name (missing entries mean identity). The two cases are a
/// tagged variant so no state exists where both a global and a per-feature
/// choice are populated at once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NormalizationStrategy {
    Global(NormalizationSpec),
    PerFeature(HashMap<String, NormalizationSpec>),
}

static IDENTITY: NormalizationSpec = NormalizationSpec::None;

impl NormalizationStrategy {
    /// The spec governing `feature_name` under this strategy.
    pub fn spec_for(&self, feature_name: &str) -> &NormalizationSpec {
        match self {
            NormalizationStrategy::Global(spec) => spec,
            NormalizationStrategy::PerFeature(map) => {
                map.get(feature_name).unwrap_or(&IDENTITY)
            }
        }
    }

    /// Applies this strategy to a sample-aligned feature set, resolving each
    /// feature's statistics by name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if a feature has no statistics entry.
    pub fn apply(
        &self,
        features: &[FeatureVector],
        stats: &DatasetStatistics,
    ) -> Result<Vec<FeatureVector>> {
        features
            .iter()
            .map(|feature| {
                let column = stats.column_by_name(&feature.name).ok_or_else(|| {
                    Error::invalid_input(format!(
                        "no statistics for feature '{}'",
                        feature.name
                    ))
                })?;
                let spec = self.spec_for(&feature.name);
                Ok(FeatureVector::new(
                    feature.name.clone(),
                    normalize_vector(&feature.values, column, spec),
                ))
            })
            .collect()
    }
}

/// Normalizes one value under `spec`.
///
/// Degenerate statistics (zero range for `MinMax`, zero deviation for
/// `ZScore`) map to 0.0 rather than NaN. A `Custom` expression that fails
/// to compile or produces a non-finite result yields the value unchanged.
pub fn normalize(value: f64, stats: &ColumnStats, spec: &NormalizationSpec) -> f64 {
    match spec {
        NormalizationSpec::None => value,
        NormalizationSpec::MinMax => min_max(value, stats),
        NormalizationSpec::ZScore => z_score(value, stats),
        NormalizationSpec::Custom(source) => match CompiledExpression::compile(source) {
            Ok(compiled) => custom(value, stats, &compiled),
            Err(_) => value,
        },
    }
}

/// Inverts [`normalize`] for the invertible spec types.
///
/// `MinMax` and `ZScore` invert exactly (up to floating-point rounding):
/// `v * (max - min) + min` and `v * std + mean` respectively. `None` is the
/// identity.
///
/// **`Custom` transforms are not invertible.** The expression language has
/// no inverse form, so denormalizing a custom-transformed value returns it
/// unchanged; consumers must treat custom-transformed axes as display-only.
pub fn denormalize(value: f64, stats: &ColumnStats, spec: &NormalizationSpec) -> f64 {
    match spec {
        NormalizationSpec::None | NormalizationSpec::Custom(_) => value,
        NormalizationSpec::MinMax => value * stats.range() + stats.min,
        NormalizationSpec::ZScore => value * stats.std + stats.mean,
    }
}

/// Normalizes a whole column under `spec`, compiling a `Custom` expression
/// once for the entire column.
pub fn normalize_vector(values: &[f64], stats: &ColumnStats, spec: &NormalizationSpec) -> Vec<f64> {
    match spec {
        NormalizationSpec::None => values.to_vec(),
        NormalizationSpec::MinMax => values.iter().map(|&v| min_max(v, stats)).collect(),
        NormalizationSpec::ZScore => values.iter().map(|&v| z_score(v, stats)).collect(),
        NormalizationSpec::Custom(source) => match CompiledExpression::compile(source) {
            Ok(compiled) => values.iter().map(|&v| custom(v, stats, &compiled)).collect(),
            Err(err) => {
                warn!("custom transform '{source}' failed to compile ({err}); passing values through");
                values.to_vec()
            }
        },
    }
}

fn min_max(value: f64, stats: &ColumnStats) -> f64 {
    let range = stats.range();
    if approx_eq!(f64, range, 0.0) {
        return 0.0;
    }
    (value - stats.min) / range
}

fn z_score(value: f64, stats: &ColumnStats) -> f64 {
    if approx_eq!(f64, stats.std, 0.0) {
        return 0.0;
    }
    (value - stats.mean) / stats.std
}

fn custom(value: f64, stats: &ColumnStats, compiled: &CompiledExpression) -> f64 {
    let result = compiled.evaluate(&Bindings::new(value, stats));
    if result.is_finite() {
        result
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn stats() -> ColumnStats {
        ColumnStats {
            min: 2.0,
            max: 10.0,
            mean: 6.0,
            std: 2.5,
        }
    }

    #[test]
    fn min_max_maps_domain_to_unit_interval() {
        let s = stats();
        assert_abs_diff_eq!(normalize(2.0, &s, &NormalizationSpec::MinMax), 0.0);
        assert_abs_diff_eq!(normalize(10.0, &s, &NormalizationSpec::MinMax), 1.0);
        assert_abs_diff_eq!(normalize(6.0, &s, &NormalizationSpec::MinMax), 0.5);
    }

    #[test]
    fn z_score_centers_and_scales() {
        let s = stats();
        assert_abs_diff_eq!(normalize(6.0, &s, &NormalizationSpec::ZScore), 0.0);
        assert_abs_diff_eq!(normalize(8.5, &s, &NormalizationSpec::ZScore), 1.0);
    }

    #[test]
    fn degenerate_statistics_normalize_to_zero() {
        let degenerate = ColumnStats {
            min: 4.0,
            max: 4.0,
            mean: 4.0,
            std: 0.0,
        };
        assert_abs_diff_eq!(normalize(4.0, &degenerate, &NormalizationSpec::MinMax), 0.0);
        assert_abs_diff_eq!(normalize(9.0, &degenerate, &NormalizationSpec::ZScore), 0.0);
    }

    #[test]
    fn round_trip_is_exact_within_tolerance() {
        let s = stats();
        for spec in [NormalizationSpec::MinMax, NormalizationSpec::ZScore] {
            for v in [2.0, 3.7, 6.0, 9.99, 10.0, -1.5] {
                let round_tripped = denormalize(normalize(v, &s, &spec), &s, &spec);
                assert!(
                    (round_tripped - v).abs() < 1e-9,
                    "{spec:?} round trip drifted: {v} -> {round_tripped}"
                );
            }
        }
    }

    #[test]
    fn custom_transform_evaluates() {
        let s = stats();
        let spec = NormalizationSpec::Custom("log(x + 1)".to_string());
        assert_abs_diff_eq!(normalize(9.0, &s, &spec), 10f64.ln(), epsilon = 1e-9);
    }

    #[test]
    fn custom_transform_falls_back_on_bad_expression() {
        let s = stats();
        let unparsable = NormalizationSpec::Custom("log(".to_string());
        assert_abs_diff_eq!(normalize(3.0, &s, &unparsable), 3.0);

        // Compiles, but sqrt of a negative value is NaN at runtime.
        let non_finite = NormalizationSpec::Custom("sqrt(0 - x)".to_string());
        assert_abs_diff_eq!(normalize(3.0, &s, &non_finite), 3.0);
    }

    #[test]
    fn custom_denormalize_is_identity() {
        let s = stats();
        let spec = NormalizationSpec::Custom("log(x + 1)".to_string());
        assert_abs_diff_eq!(denormalize(0.42, &s, &spec), 0.42);
    }

    #[test]
    fn strategy_resolution() {
        let global = NormalizationStrategy::Global(NormalizationSpec::ZScore);
        assert_eq!(global.spec_for("anything"), &NormalizationSpec::ZScore);

        let mut map = HashMap::new();
        map.insert("width".to_string(), NormalizationSpec::MinMax);
        let per_feature = NormalizationStrategy::PerFeature(map);
        assert_eq!(per_feature.spec_for("width"), &NormalizationSpec::MinMax);
        assert_eq!(per_feature.spec_for("height"), &NormalizationSpec::None);
    }

    #[test]
    fn strategy_applies_to_feature_set() {
        let features = vec![
            FeatureVector::new("a", vec![0.0, 5.0, 10.0]),
            FeatureVector::new("b", vec![1.0, 1.0, 1.0]),
        ];
        let stats = DatasetStatistics::compute(&features).unwrap();
        let strategy = NormalizationStrategy::Global(NormalizationSpec::MinMax);
        let normalized = strategy.apply(&features, &stats).unwrap();

        assert_eq!(normalized[0].values, vec![0.0, 0.5, 1.0]);
        // Constant column: zero range normalizes to the documented fallback.
        assert_eq!(normalized[1].values, vec![0.0, 0.0, 0.0]);
    }
}
