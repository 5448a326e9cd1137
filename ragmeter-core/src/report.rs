//! Per-run artifacts: JSON summary, per-sample CSV detail, and an HTML
//! report, plus optional upload to an object store.

use crate::config::{EvalConfig, OutputType};
use crate::dataset::EvalSample;
use crate::error::{EvalError, EvalResult};
use crate::generation::GeneratedOutput;
use crate::metrics::ScoredRecord;
use crate::stats::MetricSummary;
use crate::validation::JudgeValidationReport;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const SUMMARY_FILE: &str = "summary.json";
pub const RESULTS_FILE: &str = "results.csv";
pub const REPORT_FILE: &str = "report.html";

/// Identity and context of one evaluation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunMetadata {
    pub evaluation_run_name: String,
    pub mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// The aggregate result of one run, as persisted in `summary.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub metrics: BTreeMap<String, MetricSummary>,
    pub run: RunMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_validation_questions: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judge_validation: Option<JudgeValidationReport>,
}

/// Writes the artifacts selected in `outputs.types` and returns every
/// written path.
pub fn write_outputs(
    config: &EvalConfig,
    summary: &RunSummary,
    samples: &[EvalSample],
    outputs: &HashMap<String, GeneratedOutput>,
    records: &[ScoredRecord],
) -> EvalResult<Vec<PathBuf>> {
    let out_dir = config
        .outputs
        .base_dir
        .join(&summary.run.evaluation_run_name);
    fs::create_dir_all(&out_dir)?;

    let mut written = Vec::new();
    for output_type in &config.outputs.types {
        let path = match output_type {
            OutputType::Json => write_json_summary(&out_dir, summary)?,
            OutputType::Csv => write_csv_detail(&out_dir, samples, outputs, records)?,
            OutputType::Html => write_html_report(&out_dir, summary)?,
        };
        info!(path = %path.display(), "wrote evaluation artifact");
        written.push(path);
    }
    Ok(written)
}

pub fn write_json_summary(out_dir: &Path, summary: &RunSummary) -> EvalResult<PathBuf> {
    let path = out_dir.join(SUMMARY_FILE);
    fs::write(&path, serde_json::to_string_pretty(summary)?)?;
    Ok(path)
}

#[derive(Debug, Serialize)]
struct DetailRow<'a> {
    sample_id: &'a str,
    metric: &'a str,
    input: &'a str,
    source: &'a str,
    generator_config: String,
    generator_model: &'a str,
    answer: &'a str,
    reference_answer: &'a str,
    score: f64,
    explanation: &'a str,
}

/// One row per scored record, joined with the sample and its generated
/// output so the CSV is self-contained.
pub fn write_csv_detail(
    out_dir: &Path,
    samples: &[EvalSample],
    outputs: &HashMap<String, GeneratedOutput>,
    records: &[ScoredRecord],
) -> EvalResult<PathBuf> {
    let path = out_dir.join(RESULTS_FILE);
    let samples_by_id: HashMap<&str, &EvalSample> = samples
        .iter()
        .map(|s| (s.sample_id.as_str(), s))
        .collect();

    let mut writer = csv::Writer::from_path(&path)?;
    for record in records {
        let sample = samples_by_id.get(record.sample_id.as_str());
        let output = outputs.get(&record.sample_id);
        let raw = output.map(|o| &o.raw).unwrap_or(&Value::Null);

        writer.serialize(DetailRow {
            sample_id: &record.sample_id,
            metric: &record.metric,
            input: sample.map(|s| s.input.as_str()).unwrap_or_default(),
            source: sample
                .and_then(|s| s.source.as_deref())
                .unwrap_or_default(),
            generator_config: raw
                .get("config")
                .map(Value::to_string)
                .unwrap_or_default(),
            generator_model: raw
                .get("model_id")
                .or_else(|| raw.get("model"))
                .and_then(Value::as_str)
                .unwrap_or_default(),
            answer: output.map(|o| o.answer.as_str()).unwrap_or_default(),
            reference_answer: sample
                .map(|s| s.human_reference_answer.as_str())
                .unwrap_or_default(),
            score: record.score,
            explanation: &record.explanation,
        })?;
    }
    writer.flush().map_err(EvalError::from)?;
    Ok(path)
}

pub fn write_html_report(out_dir: &Path, summary: &RunSummary) -> EvalResult<PathBuf> {
    let path = out_dir.join(REPORT_FILE);

    let mut rows = String::new();
    for (metric, stats) in &summary.metrics {
        rows.push_str(&format!(
            "\n        <tr>\n          <td>{}</td>\n          <td>{:.4}</td>\n          <td>{:.4}</td>\n          <td>{:.4}</td>\n          <td>{:.4}</td>\n          <td>{:.4}</td>\n          <td>[{:.4}, {:.4}]</td>\n        </tr>\n        ",
            metric,
            stats.mean,
            stats.std,
            stats.median,
            stats.min,
            stats.max,
            stats.ci_lower,
            stats.ci_upper
        ));
    }

    let html = format!(
        r#"<!doctype html>
<html>
<head>
  <meta charset="utf-8" />
  <title>RAG Evaluation Report - {name}</title>
  <style>
    body {{ font-family: sans-serif; margin: 2rem; }}
    table {{ border-collapse: collapse; width: 100%; }}
    th, td {{ border: 1px solid #ddd; padding: 8px; }}
    th {{ background: #f4f4f4; }}
  </style>
</head>
<body>
  <h1>RAG Evaluation Report</h1>
  <h2>Aggregate Metrics</h2>
  <table>
    <thead>
      <tr>
        <th>Metric</th>
        <th>Mean</th>
        <th>Std</th>
        <th>Median</th>
        <th>Min</th>
        <th>Max</th>
        <th>95% CI (mean)</th>
      </tr>
    </thead>
    <tbody>
      {rows}
    </tbody>
  </table>
</body>
</html>
"#,
        name = summary.run.evaluation_run_name,
        rows = rows
    );

    fs::write(&path, html)?;
    Ok(path)
}

/// Destination for published artifacts.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, body: Vec<u8>) -> EvalResult<()>;
}

/// Publishes artifacts with HTTP PUT under a base URL.
pub struct HttpObjectStore {
    base_url: String,
    client: reqwest::Client,
}

impl HttpObjectStore {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put(&self, key: &str, body: Vec<u8>) -> EvalResult<()> {
        let url = format!("{}/{}", self.base_url, key);
        let response = self
            .client
            .put(&url)
            .body(body)
            .send()
            .await
            .map_err(|e| EvalError::Config(format!("upload to {url} failed: {e}")))?;
        if !response.status().is_success() {
            return Err(EvalError::Config(format!(
                "upload to {url} returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Uploads each artifact under `<run_name>/<file_name>`. A failed file
/// is logged and skipped so the run result is never lost to a flaky
/// store.
pub async fn upload_artifacts(store: &dyn ObjectStore, run_name: &str, paths: &[PathBuf]) {
    for path in paths {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let key = format!("{run_name}/{file_name}");
        let body = match fs::read(path) {
            Ok(body) => body,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping upload, cannot read artifact");
                continue;
            }
        };
        match store.put(&key, body).await {
            Ok(()) => info!(key, "uploaded artifact"),
            Err(e) => warn!(key, error = %e, "skipping failed upload"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn summary_with(metric: &str, scores: &[f64]) -> RunSummary {
        let mut metrics = BTreeMap::new();
        metrics.insert(metric.to_string(), stats::aggregate(scores));
        RunSummary {
            metrics,
            run: RunMetadata {
                evaluation_run_name: "test_run".to_string(),
                mode: "http".to_string(),
                run_timestamp: Some("2026-08-29T12:00:00".to_string()),
                notes: None,
            },
            num_validation_questions: Some(scores.len()),
            judge_validation: None,
        }
    }

    #[test]
    fn json_summary_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let summary = summary_with("correctness_binary", &[1.0, 0.0, 1.0]);

        let path = write_json_summary(dir.path(), &summary).unwrap();
        let loaded: RunSummary =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();

        assert_eq!(loaded.run.evaluation_run_name, "test_run");
        assert_eq!(loaded.num_validation_questions, Some(3));
        let loaded_summary = &loaded.metrics["correctness_binary"];
        assert!((loaded_summary.mean - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn csv_detail_joins_sample_output_and_record() {
        let dir = tempfile::tempdir().unwrap();
        let samples = vec![EvalSample {
            sample_id: "s1".to_string(),
            input: "the question".to_string(),
            human_reference_answer: "the reference".to_string(),
            human_reference_citation: None,
            source: Some("handbook.md".to_string()),
            metadata: Default::default(),
        }];
        let mut outputs = HashMap::new();
        outputs.insert(
            "s1".to_string(),
            GeneratedOutput {
                answer: "the answer".to_string(),
                contexts: vec![],
                raw: json!({"model_id": "claude-x", "config": {"temperature": 0.1}}),
            },
        );
        let records = vec![ScoredRecord::new(
            "s1",
            "correctness_binary",
            1.0,
            "matches".to_string(),
        )];

        let path = write_csv_detail(dir.path(), &samples, &outputs, &records).unwrap();
        let content = fs::read_to_string(path).unwrap();

        assert!(content.starts_with(
            "sample_id,metric,input,source,generator_config,generator_model,answer,reference_answer,score,explanation"
        ));
        assert!(content.contains("the question"));
        assert!(content.contains("handbook.md"));
        assert!(content.contains("claude-x"));
        assert!(content.contains("the reference"));
    }

    #[test]
    fn html_report_renders_four_decimal_stats() {
        let dir = tempfile::tempdir().unwrap();
        let summary = summary_with("correctness_binary", &[1.0, 0.0, 1.0]);

        let path = write_html_report(dir.path(), &summary).unwrap();
        let html = fs::read_to_string(path).unwrap();

        assert!(html.contains("<td>correctness_binary</td>"));
        assert!(html.contains("<td>0.6667</td>"));
        assert!(html.contains("<td>1.0000</td>"));
        assert!(html.contains("RAG Evaluation Report - test_run"));
    }

    #[tokio::test]
    async fn upload_skips_unreadable_files_without_failing() {
        struct RecordingStore(std::sync::Mutex<Vec<String>>);

        #[async_trait]
        impl ObjectStore for RecordingStore {
            async fn put(&self, key: &str, _body: Vec<u8>) -> EvalResult<()> {
                self.0.lock().unwrap().push(key.to_string());
                Ok(())
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().join("summary.json");
        fs::write(&real, "{}").unwrap();
        let missing = dir.path().join("does_not_exist.csv");

        let store = RecordingStore(std::sync::Mutex::new(Vec::new()));
        upload_artifacts(&store, "test_run", &[real, missing]).await;

        let keys = store.0.lock().unwrap();
        assert_eq!(keys.as_slice(), ["test_run/summary.json"]);
    }
}
