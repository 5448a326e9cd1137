//! Evaluation run configuration.
//!
//! Loaded from a JSON file; every section has serde defaults so a minimal
//! config only names the dataset and the generation endpoint. Selector
//! fields (generation backend, correctness implementation, output types)
//! are validated before any expensive work begins.

use crate::error::{EvalError, EvalResult};
use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufReader, path::Path, path::PathBuf, time::Duration};
use strum::IntoEnumIterator;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalConfig {
    pub data: DataConfig,

    #[serde(default)]
    pub run: RunConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub judge: JudgeConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,

    #[serde(default)]
    pub outputs: OutputsConfig,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judge_validation: Option<JudgeValidationConfig>,
}

impl EvalConfig {
    pub fn from_file(path: &Path) -> EvalResult<Self> {
        let file = File::open(path)?;
        let config: Self = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    /// Fail-fast checks on selector fields and cross-section requirements.
    pub fn validate(&self) -> EvalResult<()> {
        if self.run.mode == "http" && self.generation.endpoint.is_none() {
            return Err(EvalError::Config(
                "run.mode 'http' requires generation.endpoint".to_string(),
            ));
        }
        if self.run.max_concurrency == 0 {
            return Err(EvalError::Config("run.max_concurrency must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    pub eval_csv_path: PathBuf,

    #[serde(default = "default_question_column")]
    pub question_column: String,

    #[serde(default = "default_reference_column")]
    pub reference_column: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_column: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citation_column: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_column: Option<String>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            eval_csv_path: PathBuf::from("data/eval_questions.csv"),
            question_column: default_question_column(),
            reference_column: default_reference_column(),
            id_column: None,
            citation_column: None,
            source_column: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_run_name")]
    pub evaluation_run_name: String,

    /// Generation backend selector, resolved against the client registry.
    #[serde(default = "default_mode")]
    pub mode: String,

    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    #[serde(default = "default_request_timeout", with = "duration_ms")]
    pub request_timeout: Duration,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            evaluation_run_name: default_run_name(),
            mode: default_mode(),
            max_concurrency: default_max_concurrency(),
            request_timeout: default_request_timeout(),
            notes: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Required for the built-in `http` backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default = "default_user_id")]
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeConfig {
    #[serde(default = "default_judge_provider")]
    pub provider: String,

    #[serde(default = "default_judge_model")]
    pub model: String,

    #[serde(default)]
    pub temperature: f32,

    #[serde(default = "default_judge_max_tokens")]
    pub max_tokens: usize,

    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_request_timeout", with = "duration_ms")]
    pub request_timeout: Duration,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            provider: default_judge_provider(),
            model: default_judge_model(),
            temperature: 0.0,
            max_tokens: default_judge_max_tokens(),
            api_key_env: default_api_key_env(),
            request_timeout: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub semantic: SemanticMetricsConfig,

    #[serde(default)]
    pub correctness: CorrectnessConfig,
}

/// Names of the judge-prompted reference-based metrics.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SemanticMetricName {
    Faithfulness,
    AnswerRelevancy,
    ContextPrecision,
    ContextRecall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticMetricsConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_semantic_metric_names")]
    pub metric_names: Vec<SemanticMetricName>,
}

impl Default for SemanticMetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            metric_names: default_semantic_metric_names(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectnessImplementation {
    #[default]
    Binary,
    Atomic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrectnessConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub implementation: CorrectnessImplementation,
}

impl Default for CorrectnessConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            implementation: CorrectnessImplementation::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputType {
    Json,
    Csv,
    Html,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputsConfig {
    #[serde(default = "default_output_types")]
    pub types: Vec<OutputType>,

    #[serde(default = "default_base_dir")]
    pub base_dir: PathBuf,

    /// Resumable generation cache. Absent means every run regenerates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_path: Option<PathBuf>,

    /// Remote object-store base URL; artifacts are uploaded under a
    /// per-run-name prefix when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_base_url: Option<String>,
}

impl Default for OutputsConfig {
    fn default() -> Self {
        Self {
            types: default_output_types(),
            base_dir: default_base_dir(),
            cache_path: None,
            upload_base_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeValidationConfig {
    pub csv_path: PathBuf,

    #[serde(default = "default_question_column")]
    pub question_column: String,

    #[serde(default = "default_reference_column")]
    pub reference_column: String,

    #[serde(default = "default_model_answer_column")]
    pub model_answer_column: String,

    #[serde(default = "default_human_label_column")]
    pub human_label_column: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_column: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub human_explanation_column: Option<String>,
}

impl Default for JudgeValidationConfig {
    fn default() -> Self {
        Self {
            csv_path: PathBuf::from("data/judge_validation.csv"),
            question_column: default_question_column(),
            reference_column: default_reference_column(),
            model_answer_column: default_model_answer_column(),
            human_label_column: default_human_label_column(),
            id_column: None,
            human_explanation_column: None,
        }
    }
}

fn default_question_column() -> String {
    "question".to_string()
}
fn default_reference_column() -> String {
    "reference_answer".to_string()
}
fn default_model_answer_column() -> String {
    "model_answer".to_string()
}
fn default_human_label_column() -> String {
    "human_label".to_string()
}
fn default_run_name() -> String {
    "evaluation_run_default".to_string()
}
fn default_mode() -> String {
    "http".to_string()
}
fn default_max_concurrency() -> usize {
    10
}
fn default_request_timeout() -> Duration {
    Duration::from_millis(30_000)
}
fn default_user_id() -> String {
    "eval_user".to_string()
}
fn default_judge_provider() -> String {
    "openai".to_string()
}
fn default_judge_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_judge_max_tokens() -> usize {
    1024
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_semantic_metric_names() -> Vec<SemanticMetricName> {
    SemanticMetricName::iter().collect()
}
fn default_true() -> bool {
    true
}
fn default_output_types() -> Vec<OutputType> {
    vec![OutputType::Json, OutputType::Csv, OutputType::Html]
}
fn default_base_dir() -> PathBuf {
    PathBuf::from("eval_outputs")
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}
