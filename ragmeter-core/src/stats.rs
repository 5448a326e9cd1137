//! Descriptive statistics and bootstrap confidence intervals over
//! per-sample metric scores.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Deserializer, Serialize};

const BOOTSTRAP_RESAMPLES: usize = 1000;
const BOOTSTRAP_SEED: u64 = 42;

/// Aggregate statistics for one metric across a run.
///
/// All fields are NaN when the run produced no scores. JSON serializes
/// NaN as `null`, so deserialization maps `null` (and missing fields)
/// back to NaN.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MetricSummary {
    #[serde(deserialize_with = "nan_from_null", default = "f64_nan")]
    pub mean: f64,
    #[serde(deserialize_with = "nan_from_null", default = "f64_nan")]
    pub std: f64,
    #[serde(deserialize_with = "nan_from_null", default = "f64_nan")]
    pub median: f64,
    #[serde(deserialize_with = "nan_from_null", default = "f64_nan")]
    pub min: f64,
    #[serde(deserialize_with = "nan_from_null", default = "f64_nan")]
    pub max: f64,
    #[serde(deserialize_with = "nan_from_null", default = "f64_nan")]
    pub ci_lower: f64,
    #[serde(deserialize_with = "nan_from_null", default = "f64_nan")]
    pub ci_upper: f64,
}

fn f64_nan() -> f64 {
    f64::NAN
}

fn nan_from_null<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

impl MetricSummary {
    pub fn empty() -> Self {
        Self {
            mean: f64::NAN,
            std: f64::NAN,
            median: f64::NAN,
            min: f64::NAN,
            max: f64::NAN,
            ci_lower: f64::NAN,
            ci_upper: f64::NAN,
        }
    }
}

/// Computes the full summary for one metric's scores.
///
/// Standard deviation uses one delta degree of freedom, with a single
/// score yielding 0.0. The confidence interval is a 1000-resample
/// bootstrap of the mean with a fixed seed, so repeated aggregation of
/// the same scores is bit-identical.
pub fn aggregate(scores: &[f64]) -> MetricSummary {
    if scores.is_empty() {
        return MetricSummary::empty();
    }

    let mut sorted = scores.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let (ci_lower, ci_upper) = bootstrap_ci(scores);
    MetricSummary {
        mean: mean(scores),
        std: std_ddof1(scores),
        median: percentile(&sorted, 50.0),
        min: sorted[0],
        max: sorted[sorted.len() - 1],
        ci_lower,
        ci_upper,
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn std_ddof1(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let m = mean(values);
    let sum_sq: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    (sum_sq / (n - 1) as f64).sqrt()
}

/// Linear-interpolation percentile over pre-sorted values, `p` in
/// [0, 100].
fn percentile(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let rank = p / 100.0 * (n - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }
    let weight = rank - lower as f64;
    sorted[lower] * (1.0 - weight) + sorted[upper] * weight
}

fn bootstrap_ci(scores: &[f64]) -> (f64, f64) {
    let n = scores.len();
    let mut rng = StdRng::seed_from_u64(BOOTSTRAP_SEED);
    let mut resample_means = Vec::with_capacity(BOOTSTRAP_RESAMPLES);
    let mut resample = vec![0.0; n];
    for _ in 0..BOOTSTRAP_RESAMPLES {
        for slot in resample.iter_mut() {
            *slot = scores[rng.gen_range(0..n)];
        }
        resample_means.push(mean(&resample));
    }
    resample_means.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    (
        percentile(&resample_means, 2.5),
        percentile(&resample_means, 97.5),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn empty_scores_yield_all_nan() {
        let summary = aggregate(&[]);
        assert!(summary.mean.is_nan());
        assert!(summary.std.is_nan());
        assert!(summary.median.is_nan());
        assert!(summary.min.is_nan());
        assert!(summary.max.is_nan());
        assert!(summary.ci_lower.is_nan());
        assert!(summary.ci_upper.is_nan());
    }

    #[test]
    fn single_score_has_zero_std_and_degenerate_ci() {
        let summary = aggregate(&[0.7]);
        assert!(close(summary.mean, 0.7));
        assert!(close(summary.std, 0.0));
        assert!(close(summary.median, 0.7));
        assert!(close(summary.ci_lower, 0.7));
        assert!(close(summary.ci_upper, 0.7));
    }

    #[test]
    fn binary_scores_summary() {
        let summary = aggregate(&[1.0, 0.0, 1.0]);
        assert!(close(summary.mean, 2.0 / 3.0));
        assert!(close(summary.median, 1.0));
        assert!(close(summary.min, 0.0));
        assert!(close(summary.max, 1.0));
        assert!(summary.ci_lower >= 0.0 && summary.ci_upper <= 1.0);
        assert!(summary.ci_lower <= summary.mean && summary.mean <= summary.ci_upper);
    }

    #[test]
    fn std_uses_one_delta_degree_of_freedom() {
        // Sample variance of [1, 2, 3, 4] is 5/3.
        let summary = aggregate(&[1.0, 2.0, 3.0, 4.0]);
        assert!(close(summary.std, (5.0f64 / 3.0).sqrt()));
    }

    #[test]
    fn median_interpolates_for_even_counts() {
        let summary = aggregate(&[1.0, 2.0, 3.0, 4.0]);
        assert!(close(summary.median, 2.5));
    }

    #[test]
    fn bootstrap_is_deterministic() {
        let scores = [0.2, 0.9, 0.4, 0.7, 0.1, 1.0, 0.5];
        let a = aggregate(&scores);
        let b = aggregate(&scores);
        assert_eq!(a.ci_lower.to_bits(), b.ci_lower.to_bits());
        assert_eq!(a.ci_upper.to_bits(), b.ci_upper.to_bits());
    }

    #[test]
    fn ci_bounds_stay_within_observed_range() {
        let scores = [0.0, 0.25, 0.5, 0.75, 1.0];
        let summary = aggregate(&scores);
        assert!(summary.ci_lower >= 0.0);
        assert!(summary.ci_upper <= 1.0);
        assert!(summary.ci_lower <= summary.ci_upper);
    }

    #[test]
    fn summary_round_trips_through_json_with_nan_as_null() {
        let summary = MetricSummary::empty();
        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("null"));
        let back: MetricSummary = serde_json::from_str(&json).unwrap();
        assert!(back.mean.is_nan());
        assert!(back.ci_upper.is_nan());
    }

    #[test]
    fn summary_deserializes_with_missing_fields_as_nan() {
        let back: MetricSummary = serde_json::from_str(r#"{"mean": 0.5}"#).unwrap();
        assert!(close(back.mean, 0.5));
        assert!(back.std.is_nan());
    }
}
