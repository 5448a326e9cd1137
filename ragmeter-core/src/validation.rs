//! Judge calibration against human-labeled answers.
//!
//! Grades a labeled set with the configured judge and reports agreement
//! with the human labels, so drift in the judge model is visible before
//! trusting a run's scores.

use crate::dataset::JudgeValidationSample;
use crate::error::EvalResult;
use crate::judge::{self, JudgeModel};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeValidationReport {
    pub judge_model: String,
    pub n_samples: usize,
    /// Fraction of labeled samples where the binarized judge score
    /// matches the binarized human score. `None` when no sample
    /// carries a human score.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy_vs_human: Option<f64>,
}

fn grading_prompt(sample: &JudgeValidationSample) -> String {
    format!(
        "You are grading correctness (0 or 1).\n\n\
         Question:\n{}\n\n\
         Reference answer:\n{}\n\n\
         Model answer:\n{}\n\n\
         Return JSON: {{ \"score\": 0 or 1, \"explanation\": \"short explanation\" }}",
        sample.input, sample.human_reference_answer, sample.model_answer
    )
}

fn parse_score(validation_sample_id: &str, content: &str) -> f64 {
    match judge::extract_json_object(content) {
        Some(verdict) => verdict.get("score").and_then(Value::as_f64).unwrap_or(0.0),
        None => {
            warn!(
                validation_sample_id,
                raw = %judge::truncate(content, 200),
                "judge validation response did not parse"
            );
            0.0
        }
    }
}

#[tracing::instrument(skip(samples, judge), fields(n_samples = samples.len()))]
pub async fn run_judge_validation(
    samples: &[JudgeValidationSample],
    judge: &dyn JudgeModel,
    max_concurrency: usize,
) -> EvalResult<JudgeValidationReport> {
    let judge_scores: Vec<f64> = stream::iter(samples.iter().map(|sample| async move {
        let content = judge.complete(&grading_prompt(sample)).await?;
        Ok::<f64, crate::error::EvalError>(parse_score(&sample.validation_sample_id, &content))
    }))
    .buffered(max_concurrency.max(1))
    .try_collect()
    .await?;

    let labeled: Vec<(bool, bool)> = samples
        .iter()
        .zip(&judge_scores)
        .filter_map(|(sample, judge_score)| {
            sample
                .human_score
                .map(|human| (human >= 0.5, *judge_score >= 0.5))
        })
        .collect();

    let accuracy_vs_human = if labeled.is_empty() {
        None
    } else {
        let agree = labeled.iter().filter(|(human, judged)| human == judged).count();
        Some(agree as f64 / labeled.len() as f64)
    };

    let report = JudgeValidationReport {
        judge_model: judge.model_name().to_string(),
        n_samples: samples.len(),
        accuracy_vs_human,
    };
    info!(
        judge_model = %report.judge_model,
        n_samples = report.n_samples,
        accuracy = ?report.accuracy_vs_human,
        "judge validation complete"
    );
    Ok(report)
}
