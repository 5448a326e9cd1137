//! Metric scoring over generated outputs.
//!
//! Every metric sees the full aligned slice of samples and outputs and
//! emits one [`ScoredRecord`] per sample. Judge transport failures
//! propagate out of a metric; malformed judge responses are scored
//! locally instead of aborting the run.

pub mod atomic;
pub mod binary;
pub mod semantic;

use crate::config::{CorrectnessImplementation, MetricsConfig};
use crate::dataset::EvalSample;
use crate::error::EvalResult;
use crate::generation::GeneratedOutput;
use crate::judge::JudgeModel;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use atomic::AtomicCorrectnessMetric;
pub use binary::BinaryCorrectnessMetric;
pub use semantic::SemanticMetricSet;

/// One metric score for one sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredRecord {
    pub sample_id: String,
    pub metric: String,
    pub score: f64,
    pub explanation: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub detail: Value,
}

impl ScoredRecord {
    pub fn new(sample_id: &str, metric: &str, score: f64, explanation: String) -> Self {
        Self {
            sample_id: sample_id.to_string(),
            metric: metric.to_string(),
            score,
            explanation,
            detail: Value::Null,
        }
    }
}

/// A scoring strategy over a finished generation batch.
#[async_trait]
pub trait Metric: Send + Sync {
    fn name(&self) -> &str;

    /// Scores every sample. `samples` and `outputs` are index-aligned.
    async fn evaluate(
        &self,
        samples: &[EvalSample],
        outputs: &[GeneratedOutput],
        judge: &dyn JudgeModel,
    ) -> EvalResult<Vec<ScoredRecord>>;
}

/// Instantiates the metric set selected by configuration.
pub fn build_metrics(config: &MetricsConfig, max_concurrency: usize) -> Vec<Box<dyn Metric>> {
    let mut metrics: Vec<Box<dyn Metric>> = Vec::new();
    if config.correctness.enabled {
        match config.correctness.implementation {
            CorrectnessImplementation::Binary => {
                metrics.push(Box::new(BinaryCorrectnessMetric::new(max_concurrency)));
            }
            CorrectnessImplementation::Atomic => {
                metrics.push(Box::new(AtomicCorrectnessMetric::new(max_concurrency)));
            }
        }
    }
    if config.semantic.enabled && !config.semantic.metric_names.is_empty() {
        metrics.push(Box::new(SemanticMetricSet::new(
            config.semantic.metric_names.clone(),
            max_concurrency,
        )));
    }
    metrics
}
