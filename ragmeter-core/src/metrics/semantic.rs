use crate::config::SemanticMetricName;
use crate::dataset::EvalSample;
use crate::error::EvalResult;
use crate::generation::GeneratedOutput;
use crate::judge::{self, JudgeModel};
use crate::metrics::{Metric, ScoredRecord};
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde_json::Value;
use tracing::warn;

/// Judge-prompted reference-based metrics over answers and retrieved
/// contexts. One judge call per sample per metric name; each call
/// grades a single dimension on a 0 to 1 scale.
pub struct SemanticMetricSet {
    metric_names: Vec<SemanticMetricName>,
    max_concurrency: usize,
}

impl SemanticMetricSet {
    pub fn new(metric_names: Vec<SemanticMetricName>, max_concurrency: usize) -> Self {
        Self {
            metric_names,
            max_concurrency: max_concurrency.max(1),
        }
    }

    fn criterion(metric: SemanticMetricName) -> &'static str {
        match metric {
            SemanticMetricName::Faithfulness => {
                "Faithfulness: every claim in the model answer must be supported \
                 by the retrieved contexts. Penalize claims absent from the contexts."
            }
            SemanticMetricName::AnswerRelevancy => {
                "Answer relevancy: the model answer must directly address the \
                 question. Penalize off-topic, incomplete, or evasive answers."
            }
            SemanticMetricName::ContextPrecision => {
                "Context precision: the retrieved contexts must be relevant to \
                 answering the question. Penalize irrelevant retrieved contexts."
            }
            SemanticMetricName::ContextRecall => {
                "Context recall: the retrieved contexts must cover the information \
                 in the reference answer. Penalize missing supporting material."
            }
        }
    }

    fn prompt(metric: SemanticMetricName, sample: &EvalSample, output: &GeneratedOutput) -> String {
        let contexts = if output.contexts.is_empty() {
            "(no contexts retrieved)".to_string()
        } else {
            output
                .contexts
                .iter()
                .enumerate()
                .map(|(i, c)| format!("[{}] {}", i + 1, c))
                .collect::<Vec<_>>()
                .join("\n")
        };
        format!(
            "Grade the following RAG result on one criterion.\n\n\
             Criterion:\n{}\n\n\
             Question:\n{}\n\n\
             Reference answer:\n{}\n\n\
             Retrieved contexts:\n{}\n\n\
             Model answer:\n{}\n\n\
             Return JSON with:\n\
             - score: a float between 0.0 and 1.0\n\
             - reasoning: short explanation",
            Self::criterion(metric),
            sample.input,
            sample.human_reference_answer,
            contexts,
            output.answer
        )
    }

    fn parse_verdict(sample_id: &str, metric: SemanticMetricName, content: &str) -> (f64, String) {
        let Some(verdict) = judge::extract_json_object(content) else {
            warn!(
                sample_id,
                metric = %metric,
                raw = %judge::truncate(content, 200),
                "semantic grading response did not parse"
            );
            return (0.0, "Failed to parse judge response.".to_string());
        };
        let score = verdict
            .get("score")
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
            .clamp(0.0, 1.0);
        let reasoning = verdict
            .get("reasoning")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        (score, reasoning)
    }
}

#[async_trait]
impl Metric for SemanticMetricSet {
    fn name(&self) -> &str {
        "semantic"
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
            .flat_map(|(sample, output)| {
                self.metric_names.iter().map(move |&metric| async move {
                    let content = judge.complete(&Self::prompt(metric, sample, output)).await?;
                    let (score, reasoning) =
                        Self::parse_verdict(&sample.sample_id, metric, &content);
                    Ok(ScoredRecord::new(
                        &sample.sample_id,
                        &metric.to_string(),
                        score,
                        reasoning,
                    ))
                })
            })
            .collect();
        stream::iter(calls)
            .buffered(self.max_concurrency)
            .try_collect()
            .await
    }
}
