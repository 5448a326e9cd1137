use crate::dataset::EvalSample;
use crate::error::EvalResult;
use crate::generation::GeneratedOutput;
use crate::judge::{self, JudgeModel};
use crate::metrics::{Metric, ScoredRecord};
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde_json::Value;
use tracing::warn;

const METRIC_NAME: &str = "correctness_binary";
const PARSE_FAILURE_EXPLANATION: &str = "Failed to parse judge response.";

/// Pass/fail correctness against the human reference answer.
///
/// One judge call per sample. A response that does not parse as the
/// requested JSON scores 0 rather than failing the run.
pub struct BinaryCorrectnessMetric {
    max_concurrency: usize,
}

impl BinaryCorrectnessMetric {
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
        }
    }

    fn prompt(sample: &EvalSample, output: &GeneratedOutput) -> String {
        format!(
            "You are grading the factual correctness of the model answer\n\
             compared to the reference answer.\n\n\
             Question:\n{}\n\n\
             Reference answer:\n{}\n\n\
             Model answer:\n{}\n\n\
             Return JSON with:\n\
             - score: 0 or 1\n\
             - explanation: short explanation",
            sample.input, sample.human_reference_answer, output.answer
        )
    }

    fn parse_verdict(sample_id: &str, content: &str) -> (f64, String) {
        let Some(verdict) = judge::extract_json_object(content) else {
            warn!(
                sample_id,
                raw = %judge::truncate(content, 200),
                "judge response did not contain a JSON object"
            );
            return (0.0, PARSE_FAILURE_EXPLANATION.to_string());
        };
        let score = verdict
            .get("score")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        let explanation = verdict
            .get("explanation")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        (score, explanation)
    }
}

#[async_trait]
impl Metric for BinaryCorrectnessMetric {
    fn name(&self) -> &str {
        METRIC_NAME
    }

    async fn evaluate(
        &self,
        samples: &[EvalSample],
        outputs: &[GeneratedOutput],
        judge: &dyn JudgeModel,
    ) -> EvalResult<Vec<ScoredRecord>> {
        let calls: Vec<_> = samples
            .iter()
            .zip(outputs)
            .map(|(sample, output)| async move {
                let content = judge.complete(&Self::prompt(sample, output)).await?;
                let (score, explanation) = Self::parse_verdict(&sample.sample_id, &content);
                Ok(ScoredRecord::new(&sample.sample_id, METRIC_NAME, score, explanation))
            })
            .collect();
        stream::iter(calls).buffered(self.max_concurrency).try_collect().await
    }
}
