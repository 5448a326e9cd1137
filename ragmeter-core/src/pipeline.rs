//! End-to-end evaluation run.
//!
//! A run moves through fixed stages: load samples, resolve answers
//! (cache plus generation), score with the configured metrics,
//! aggregate, attach optional judge validation, write artifacts, and
//! optionally upload them. Generation failures abort the run before
//! any judge spend; scoring gaps degrade to recorded zero scores
//! inside the metrics instead.

use crate::cache::ResultCache;
use crate::config::EvalConfig;
use crate::dataset::{self, EvalSample};
use crate::error::{EvalError, EvalResult};
use crate::generation::{self, AnswerClient, ClientRegistry, GeneratedOutput};
use crate::judge::{JudgeModel, OpenAiJudge};
use crate::metrics::{self, Metric, ScoredRecord};
use crate::report::{self, HttpObjectStore, RunMetadata, RunSummary};
use crate::stats;
use crate::timestamp;
use crate::validation;
use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};

pub struct EvalPipeline {
    config: EvalConfig,
    client: Box<dyn AnswerClient>,
    judge: Box<dyn JudgeModel>,
    metrics: Vec<Box<dyn Metric>>,
}

impl EvalPipeline {
    /// Resolves the generation backend and judge provider from
    /// configuration, with credentials taken from the environment.
    pub fn from_config(config: EvalConfig) -> EvalResult<Self> {
        Self::with_registry(config, &ClientRegistry::with_default_backends())
    }

    /// Same as [`Self::from_config`] but against a caller-supplied
    /// backend registry, for embedders with in-process clients.
    pub fn with_registry(config: EvalConfig, registry: &ClientRegistry) -> EvalResult<Self> {
        config.validate()?;
        let client = registry.build(&config)?;
        let judge: Box<dyn JudgeModel> = match config.judge.provider.as_str() {
            "openai" => Box::new(OpenAiJudge::from_env(config.judge.clone())?),
            other => {
                return Err(EvalError::Config(format!("unknown judge.provider: {other}")));
            }
        };
        let metrics = metrics::build_metrics(&config.metrics, config.run.max_concurrency);
        Ok(Self::new(config, client, judge, metrics))
    }

    /// Fully explicit constructor, used directly in tests.
    pub fn new(
        config: EvalConfig,
        client: Box<dyn AnswerClient>,
        judge: Box<dyn JudgeModel>,
        metrics: Vec<Box<dyn Metric>>,
    ) -> Self {
        Self {
            config,
            client,
            judge,
            metrics,
        }
    }

    #[tracing::instrument(skip(self), fields(run_name = %self.config.run.evaluation_run_name))]
    pub async fn run(&self) -> EvalResult<RunSummary> {
        let samples = dataset::load_samples(&self.config.data)?;
        let outputs = self.resolve_outputs(&samples).await?;

        // Metrics see outputs aligned with sample order.
        let ordered: Vec<GeneratedOutput> = samples
            .iter()
            .map(|sample| {
                outputs.get(&sample.sample_id).cloned().ok_or_else(|| {
                    EvalError::Generation {
                        sample_id: sample.sample_id.clone(),
                        message: "no generated output after generation stage".to_string(),
                    }
                })
            })
            .collect::<EvalResult<_>>()?;

        let mut records: Vec<ScoredRecord> = Vec::new();
        for metric in &self.metrics {
            info!(metric = metric.name(), "scoring");
            let scored = metric
                .evaluate(&samples, &ordered, self.judge.as_ref())
                .await?;
            records.extend(scored);
        }

        let mut scores_by_metric: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for record in &records {
            scores_by_metric
                .entry(record.metric.clone())
                .or_default()
                .push(record.score);
        }
        if scores_by_metric.is_empty() {
            warn!("no scorable metric records produced; summary will carry no metrics");
        }

        let metrics_summary = scores_by_metric
            .into_iter()
            .map(|(metric, scores)| (metric, stats::aggregate(&scores)))
            .collect();

        let mut summary = RunSummary {
            metrics: metrics_summary,
            run: RunMetadata {
                evaluation_run_name: self.config.run.evaluation_run_name.clone(),
                mode: self.config.run.mode.clone(),
                run_timestamp: Some(timestamp::to_string(&timestamp::now())),
                notes: self.config.run.notes.clone(),
            },
            num_validation_questions: Some(samples.len()),
            judge_validation: None,
        };

        if let Some(validation_config) = &self.config.judge_validation {
            let validation_samples = dataset::load_judge_validation_samples(validation_config)?;
            let report = validation::run_judge_validation(
                &validation_samples,
                self.judge.as_ref(),
                self.config.run.max_concurrency,
            )
            .await?;
            summary.judge_validation = Some(report);
        }

        let written = report::write_outputs(&self.config, &summary, &samples, &outputs, &records)?;

        if let Some(base_url) = &self.config.outputs.upload_base_url {
            let store = HttpObjectStore::new(base_url.clone());
            report::upload_artifacts(&store, &summary.run.evaluation_run_name, &written).await;
        }

        Ok(summary)
    }

    /// Loads cached generations, generates only the missing samples,
    /// and re-saves the merged set so a later run starts complete.
    async fn resolve_outputs(
        &self,
        samples: &[EvalSample],
    ) -> EvalResult<HashMap<String, GeneratedOutput>> {
        let cache = self
            .config
            .outputs
            .cache_path
            .as_ref()
            .map(ResultCache::new);

        let mut outputs = match &cache {
            Some(cache) => cache.load()?.unwrap_or_default(),
            None => HashMap::new(),
        };

        let missing: Vec<EvalSample> = samples
            .iter()
            .filter(|sample| !outputs.contains_key(&sample.sample_id))
            .cloned()
            .collect();
        info!(
            total = samples.len(),
            cached = samples.len() - missing.len(),
            to_generate = missing.len(),
            "resolving generated outputs"
        );

        if !missing.is_empty() {
            let generated = generation::run_batch(
                self.client.as_ref(),
                &missing,
                self.config.run.max_concurrency,
                self.config.run.request_timeout,
            )
            .await?;
            for (sample, output) in missing.iter().zip(generated) {
                outputs.insert(sample.sample_id.clone(), output);
            }
        }

        if let Some(cache) = &cache {
            cache.save(samples, &outputs)?;
        }
        Ok(outputs)
    }
}
