//! Evaluation sample loading.
//!
//! Samples come from a CSV file with configurable column names. The question
//! and reference-answer columns are required and their absence is fatal before
//! any generation starts; every unmapped column is preserved as free-form
//! per-sample metadata (which the generation backends may consume, e.g.
//! `conversation_id` or `retrieval_filters`).

use crate::config::{DataConfig, JudgeValidationConfig};
use crate::error::{EvalError, EvalResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

/// One evaluation question. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalSample {
    pub sample_id: String,
    pub input: String,
    pub human_reference_answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub human_reference_citation: Option<String>,
    /// "human" or "ai" - origin of the question and reference answer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// One labeled row for judge validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeValidationSample {
    pub validation_sample_id: String,
    pub input: String,
    pub human_reference_answer: String,
    pub model_answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub human_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub human_explanation: Option<String>,
}

fn column_index(headers: &csv::StringRecord, name: &str) -> Option<usize> {
    headers.iter().position(|h| h == name)
}

fn require_column(headers: &csv::StringRecord, name: &str, what: &str) -> EvalResult<usize> {
    column_index(headers, name)
        .ok_or_else(|| EvalError::Config(format!("missing column {name} in {what}")))
}

/// Load the evaluation sample set.
pub fn load_samples(config: &DataConfig) -> EvalResult<Vec<EvalSample>> {
    let mut reader = csv::Reader::from_path(&config.eval_csv_path)?;
    let headers = reader.headers()?.clone();

    let question_idx = require_column(&headers, &config.question_column, "eval CSV")?;
    let reference_idx = require_column(&headers, &config.reference_column, "eval CSV")?;
    let id_idx = config.id_column.as_deref().and_then(|c| column_index(&headers, c));
    let citation_idx = config
        .citation_column
        .as_deref()
        .and_then(|c| column_index(&headers, c));
    let source_idx = config.source_column.as_deref().and_then(|c| column_index(&headers, c));

    let mapped: Vec<usize> = [Some(question_idx), Some(reference_idx), id_idx, citation_idx, source_idx]
        .into_iter()
        .flatten()
        .collect();

    let mut samples = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        let field = |idx: usize| record.get(idx).unwrap_or_default().to_string();

        let sample_id = id_idx.map(field).unwrap_or_else(|| row.to_string());

        let mut metadata = BTreeMap::new();
        for (idx, header) in headers.iter().enumerate() {
            if !mapped.contains(&idx) {
                metadata.insert(header.to_string(), field(idx));
            }
        }

        samples.push(EvalSample {
            sample_id,
            input: field(question_idx),
            human_reference_answer: field(reference_idx),
            human_reference_citation: citation_idx.map(field).filter(|v| !v.is_empty()),
            source: source_idx.map(field).filter(|v| !v.is_empty()),
            metadata,
        });
    }

    info!(
        count = samples.len(),
        path = %config.eval_csv_path.display(),
        "loaded evaluation samples"
    );
    Ok(samples)
}

/// Load the labeled judge-validation set.
pub fn load_judge_validation_samples(
    config: &JudgeValidationConfig,
) -> EvalResult<Vec<JudgeValidationSample>> {
    load_judge_validation_from(&config.csv_path, config)
}

fn load_judge_validation_from(
    path: &Path,
    config: &JudgeValidationConfig,
) -> EvalResult<Vec<JudgeValidationSample>> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();

    let question_idx = require_column(&headers, &config.question_column, "judge-validation CSV")?;
    let reference_idx = require_column(&headers, &config.reference_column, "judge-validation CSV")?;
    let answer_idx = require_column(&headers, &config.model_answer_column, "judge-validation CSV")?;
    let label_idx = require_column(&headers, &config.human_label_column, "judge-validation CSV")?;
    let id_idx = config.id_column.as_deref().and_then(|c| column_index(&headers, c));
    let explanation_idx = config
        .human_explanation_column
        .as_deref()
        .and_then(|c| column_index(&headers, c));

    let mut samples = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        let field = |idx: usize| record.get(idx).unwrap_or_default().to_string();

        let human_score = record
            .get(label_idx)
            .filter(|v| !v.trim().is_empty())
            .map(|v| {
                v.trim().parse::<f64>().map_err(|_| {
                    EvalError::Dataset(format!("invalid human label '{v}' in row {row}"))
                })
            })
            .transpose()?;

        samples.push(JudgeValidationSample {
            validation_sample_id: id_idx.map(field).unwrap_or_else(|| row.to_string()),
            input: field(question_idx),
            human_reference_answer: field(reference_idx),
            model_answer: field(answer_idx),
            human_score,
            human_explanation: explanation_idx.map(field).filter(|v| !v.is_empty()),
        });
    }

    Ok(samples)
}
