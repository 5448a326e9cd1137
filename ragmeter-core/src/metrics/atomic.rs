use crate::dataset::EvalSample;
use crate::error::EvalResult;
use crate::generation::GeneratedOutput;
use crate::judge::{self, JudgeModel};
use crate::metrics::{Metric, ScoredRecord};
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::warn;

const METRIC_NAME: &str = "correctness_atomic";

/// Decompose-then-verify correctness.
///
/// The reference answer is first decomposed into atomic facts, then
/// each fact is checked against the model answer with an independent
/// judge call. The score is the fraction of facts found. Verification
/// calls for one sample run concurrently; verdicts are re-sorted by
/// fact index so the recorded detail is stable.
pub struct AtomicCorrectnessMetric {
    max_concurrency: usize,
}

#[derive(Debug, Serialize)]
struct FactVerdict {
    index: usize,
    fact: String,
    found: bool,
    explanation: String,
}

impl AtomicCorrectnessMetric {
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
        }
    }

    fn extraction_prompt(sample: &EvalSample) -> String {
        format!(
            "Decompose the reference answer into a list of short, independent,\n\
             atomic factual statements. Each statement must be verifiable on its own.\n\n\
             Question:\n{}\n\n\
             Reference answer:\n{}\n\n\
             Return a JSON array of strings, one per atomic fact.",
            sample.input, sample.human_reference_answer
        )
    }

    fn verification_prompt(fact: &str, output: &GeneratedOutput) -> String {
        format!(
            "Decide whether the model answer states or entails the fact below.\n\n\
             Fact:\n{}\n\n\
             Model answer:\n{}\n\n\
             Return JSON with:\n\
             - found: true or false\n\
             - explanation: short explanation",
            fact, output.answer
        )
    }

    async fn extract_facts(
        sample: &EvalSample,
        judge: &dyn JudgeModel,
    ) -> EvalResult<Option<Vec<String>>> {
        let content = judge.complete(&Self::extraction_prompt(sample)).await?;
        let Some(Value::Array(items)) = judge::extract_json_array(&content) else {
            warn!(
                sample_id = %sample.sample_id,
                raw = %judge::truncate(&content, 200),
                "fact extraction did not return a JSON array"
            );
            return Ok(None);
        };
        let facts: Vec<String> = items
            .into_iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .filter(|fact| !fact.trim().is_empty())
            .collect();
        Ok(Some(facts))
    }

    async fn verify_fact(
        sample_id: &str,
        index: usize,
        fact: String,
        output: &GeneratedOutput,
        judge: &dyn JudgeModel,
    ) -> EvalResult<FactVerdict> {
        let content = judge.complete(&Self::verification_prompt(&fact, output)).await?;
        let (found, explanation) = match judge::extract_json_object(&content) {
            Some(verdict) => (
                verdict.get("found").and_then(Value::as_bool).unwrap_or(false),
                verdict
                    .get("explanation")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            ),
            None => {
                warn!(
                    sample_id,
                    fact_index = index,
                    raw = %judge::truncate(&content, 200),
                    "fact verification response did not parse"
                );
                (false, "Failed to parse judge response.".to_string())
            }
        };
        Ok(FactVerdict {
            index,
            fact,
            found,
            explanation,
        })
    }

    async fn score_sample(
        &self,
        sample: &EvalSample,
        output: &GeneratedOutput,
        judge: &dyn JudgeModel,
    ) -> EvalResult<ScoredRecord> {
        let facts = match Self::extract_facts(sample, judge).await? {
            Some(facts) if !facts.is_empty() => facts,
            Some(_) => {
                return Ok(ScoredRecord::new(
                    &sample.sample_id,
                    METRIC_NAME,
                    0.0,
                    "No atomic facts extracted from reference answer.".to_string(),
                ));
            }
            None => {
                return Ok(ScoredRecord::new(
                    &sample.sample_id,
                    METRIC_NAME,
                    0.0,
                    "Failed to parse fact extraction response.".to_string(),
                ));
            }
        };

        let total = facts.len();
        let mut verdicts: Vec<FactVerdict> =
            stream::iter(facts.into_iter().enumerate().map(|(index, fact)| {
                Self::verify_fact(&sample.sample_id, index, fact, output, judge)
            }))
            .buffer_unordered(self.max_concurrency)
            .try_collect()
            .await?;
        verdicts.sort_by_key(|v| v.index);

        let found = verdicts.iter().filter(|v| v.found).count();
        let score = found as f64 / total as f64;
        let mut record = ScoredRecord::new(
            &sample.sample_id,
            METRIC_NAME,
            score,
            format!("{found} of {total} atomic facts found in model answer."),
        );
        record.detail = json!({
            "total_facts": total,
            "facts_found": found,
            "fact_evaluations": verdicts,
        });
        Ok(record)
    }
}

#[async_trait]
impl Metric for AtomicCorrectnessMetric {
    fn name(&self) -> &str {
        METRIC_NAME
    }

    async fn evaluate(
        &self,
        samples: &[EvalSample],
        outputs: &[GeneratedOutput],
        judge: &dyn JudgeModel,
    ) -> EvalResult<Vec<ScoredRecord>> {
        // Samples run sequentially; fact verification inside a sample
        // provides the concurrency.
        let mut records = Vec::with_capacity(samples.len());
        for (sample, output) in samples.iter().zip(outputs) {
            records.push(self.score_sample(sample, output, judge).await?);
        }
        Ok(records)
    }
}
