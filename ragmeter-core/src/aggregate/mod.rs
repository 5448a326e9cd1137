//! Cross-run aggregation.
//!
//! Collects `summary.json` artifacts from local run directories or a
//! remote index, deduplicates them against the persistent CSV store,
//! and renders a markdown report of every metric over time. Chart
//! images are referenced by deterministic names and rendered by an
//! external step.

pub mod store;

use crate::error::{AggregateError, AggregateResult};
use crate::report::RunSummary;
use crate::timestamp;
use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const STORE_FILE: &str = "evaluation_results.csv";
pub const REPORT_FILE: &str = "evaluation_results.md";
const COMBINED_CHART: &str = "eval_all_metrics_combined.png";

/// One run as seen by aggregation, with its identity timestamp already
/// normalized to naive UTC.
#[derive(Debug, Clone)]
pub struct HistoricalRun {
    pub summary: RunSummary,
    pub timestamp: Option<NaiveDateTime>,
    pub source_path: Option<PathBuf>,
}

impl HistoricalRun {
    /// Builds from a loaded summary, falling back to the artifact's
    /// mtime when the summary carries no parseable timestamp.
    pub fn from_summary(summary: RunSummary, source_path: Option<PathBuf>) -> Self {
        let timestamp = summary
            .run
            .run_timestamp
            .as_deref()
            .and_then(timestamp::parse_normalized)
            .or_else(|| {
                source_path
                    .as_deref()
                    .and_then(|path| fs::metadata(path).ok())
                    .and_then(|meta| meta.modified().ok())
                    .map(timestamp::from_system_time)
            });
        Self {
            summary,
            timestamp,
            source_path,
        }
    }

    fn run_name(&self) -> &str {
        &self.summary.run.evaluation_run_name
    }

    /// Unique identity within a report. Runs sharing a name are told
    /// apart by timestamp; a run without one collapses onto the bare
    /// name.
    pub fn run_id(&self) -> String {
        match self.timestamp {
            Some(ts) => format!("{}_{}", self.run_name(), timestamp::to_string(&ts)),
            None => self.run_name().to_string(),
        }
    }

    fn dedup_key(&self) -> (String, Option<NaiveDateTime>) {
        (self.run_name().to_string(), self.timestamp)
    }
}

/// Finds every `summary.json` under `results_dir`. Unreadable or
/// malformed files are logged and skipped.
pub fn collect_local(results_dir: &Path) -> AggregateResult<Vec<HistoricalRun>> {
    if !results_dir.exists() {
        warn!(dir = %results_dir.display(), "results directory does not exist");
        return Ok(Vec::new());
    }

    let pattern = format!("{}/**/summary.json", results_dir.display());
    let paths = glob::glob(&pattern)
        .map_err(|e| AggregateError::Io(std::io::Error::other(e.to_string())))?;

    let mut runs = Vec::new();
    for entry in paths {
        let path = match entry {
            Ok(path) => path,
            Err(e) => {
                warn!(error = %e, "skipping unreadable path");
                continue;
            }
        };
        match read_summary(&path) {
            Ok(summary) => runs.push(HistoricalRun::from_summary(summary, Some(path))),
            Err(e) => warn!(path = %path.display(), error = %e, "skipping malformed summary"),
        }
    }
    info!(dir = %results_dir.display(), runs = runs.len(), "collected local results");
    Ok(runs)
}

fn read_summary(path: &Path) -> AggregateResult<RunSummary> {
    Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
}

/// Fetches up to `max_runs` summaries listed by the remote index at
/// `<base_url>/index.json`. Expired or malformed entries are logged
/// and skipped, so one retired artifact never blocks aggregation.
pub async fn fetch_remote(base_url: &str, max_runs: usize) -> AggregateResult<Vec<HistoricalRun>> {
    let base = base_url.trim_end_matches('/');
    let client = reqwest::Client::new();

    let index_url = format!("{base}/index.json");
    let entries: Vec<String> = client
        .get(&index_url)
        .send()
        .await
        .map_err(|e| AggregateError::Http(format!("{index_url}: {e}")))?
        .error_for_status()
        .map_err(|e| AggregateError::Http(format!("{index_url}: {e}")))?
        .json()
        .await
        .map_err(|e| AggregateError::Http(format!("{index_url}: {e}")))?;

    let mut runs = Vec::new();
    for entry in entries.iter().rev().take(max_runs) {
        let url = if entry.starts_with("http://") || entry.starts_with("https://") {
            entry.clone()
        } else {
            format!("{base}/{}", entry.trim_start_matches('/'))
        };
        let response = match client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(url, error = %e, "skipping unreachable summary");
                continue;
            }
        };
        if !response.status().is_success() {
            warn!(url, status = %response.status(), "skipping unavailable summary");
            continue;
        }
        match response.json::<RunSummary>().await {
            Ok(summary) => runs.push(HistoricalRun::from_summary(summary, None)),
            Err(e) => warn!(url, error = %e, "skipping malformed remote summary"),
        }
    }
    info!(base_url, runs = runs.len(), "fetched remote results");
    Ok(runs)
}

/// Deduplicates by `(run_name, timestamp)`, later entries winning, and
/// returns runs ordered by timestamp with timestamp-less runs first.
pub fn merge(batches: Vec<Vec<HistoricalRun>>) -> Vec<HistoricalRun> {
    let mut merged: BTreeMap<(String, Option<NaiveDateTime>), HistoricalRun> = BTreeMap::new();
    for batch in batches {
        for run in batch {
            merged.insert(run.dedup_key(), run);
        }
    }
    let mut runs: Vec<HistoricalRun> = merged.into_values().collect();
    runs.sort_by_key(|run| (run.timestamp, run.run_id()));
    runs
}

fn chart_file(metric: &str) -> String {
    let safe: String = metric
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    format!("eval_metric_{safe}.png")
}

fn title_case(metric: &str) -> String {
    metric
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn render_metric_table(metric: &str, runs: &[HistoricalRun]) -> String {
    let mut lines = vec![
        format!("| Run Name | Timestamp | {} |", title_case(metric)),
        format!("|----------|-----------|{}|", "-".repeat(metric.len() + 10)),
    ];
    for run in runs {
        let timestamp = run
            .timestamp
            .map(|ts| timestamp::display_short(&ts))
            .unwrap_or_else(|| "N/A".to_string());
        let value = run
            .summary
            .metrics
            .get(metric)
            .map(|s| s.mean)
            .filter(|mean| !mean.is_nan())
            .map(|mean| format!("{mean:.4}"))
            .unwrap_or_else(|| "N/A".to_string());
        lines.push(format!("| {} | {} | {} |", run.run_name(), timestamp, value));
    }
    lines.join("\n")
}

/// Writes the markdown report over all runs, ordered oldest first.
pub fn write_markdown_report(output_dir: &Path, runs: &[HistoricalRun]) -> AggregateResult<PathBuf> {
    fs::create_dir_all(output_dir)?;
    let path = output_dir.join(REPORT_FILE);

    let metric_names: Vec<String> = runs
        .iter()
        .flat_map(|run| run.summary.metrics.keys().cloned())
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut report = String::new();
    report.push_str("# Evaluation Results Over Time\n\n");
    report.push_str(&format!(
        "*Generated on {}*\n\n",
        timestamp::now().format("%Y-%m-%d %H:%M:%S")
    ));
    report.push_str("## Evaluations Summary\n\n");
    report.push_str("| Run Name | Mode | Timestamp | Num Questions | Notes |\n");
    report.push_str("|----------|------|-----------|--------------|-------|\n");
    for run in runs {
        let timestamp = run
            .summary
            .run
            .run_timestamp
            .clone()
            .unwrap_or_else(|| "N/A".to_string());
        let num_questions = run
            .summary
            .num_validation_questions
            .map(|n| n.to_string())
            .unwrap_or_default();
        let notes = run.summary.run.notes.clone().unwrap_or_default();
        report.push_str(&format!(
            "| {} | {} | {} | {} | {} |\n",
            run.run_name(),
            run.summary.run.mode,
            timestamp,
            num_questions,
            notes
        ));
    }
    report.push('\n');
    report.push_str(&format!("![All Metrics Combined]({COMBINED_CHART})\n\n"));

    report.push_str("## Evaluation Metric Details\n\n");
    for metric in &metric_names {
        let display = title_case(metric);
        report.push_str(&format!("### {display}\n\n"));
        report.push_str(&format!("![{display}]({})\n\n", chart_file(metric)));
        report.push_str(&render_metric_table(metric, runs));
        report.push_str("\n\n");
    }

    fs::write(&path, report)?;
    info!(path = %path.display(), "wrote aggregation report");
    Ok(path)
}

#[derive(Debug)]
pub struct AggregateOutcome {
    pub num_runs: usize,
    pub store_path: PathBuf,
    pub report_path: PathBuf,
}

fn finish(new_runs: Vec<HistoricalRun>, output_dir: &Path) -> AggregateResult<AggregateOutcome> {
    let store_path = output_dir.join(STORE_FILE);
    let existing = store::load(&store_path)?;
    let runs = merge(vec![existing, new_runs]);
    if runs.is_empty() {
        warn!("no evaluation runs to aggregate");
    }
    store::save(&store_path, &runs)?;
    let report_path = write_markdown_report(output_dir, &runs)?;
    Ok(AggregateOutcome {
        num_runs: runs.len(),
        store_path,
        report_path,
    })
}

/// Aggregates every run found under `results_dir` into `output_dir`,
/// merging with the store already there.
pub fn aggregate_local_results(
    results_dir: &Path,
    output_dir: &Path,
) -> AggregateResult<AggregateOutcome> {
    finish(collect_local(results_dir)?, output_dir)
}

/// Aggregates runs listed by a remote index into `output_dir`.
pub async fn aggregate_remote_results(
    base_url: &str,
    max_runs: usize,
    output_dir: &Path,
) -> AggregateResult<AggregateOutcome> {
    finish(fetch_remote(base_url, max_runs).await?, output_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::RunMetadata;
    use crate::stats;
    use pretty_assertions::assert_eq;

    fn run(name: &str, ts: Option<&str>, metric: &str, scores: &[f64]) -> HistoricalRun {
        let mut metrics = BTreeMap::new();
        metrics.insert(metric.to_string(), stats::aggregate(scores));
        HistoricalRun::from_summary(
            RunSummary {
                metrics,
                run: RunMetadata {
                    evaluation_run_name: name.to_string(),
                    mode: "http".to_string(),
                    run_timestamp: ts.map(str::to_string),
                    notes: None,
                },
                num_validation_questions: Some(scores.len()),
                judge_validation: None,
            },
            None,
        )
    }

    #[test]
    fn merge_deduplicates_by_name_and_normalized_timestamp() {
        // Same instant written once with an offset and once naive.
        let aware = run("nightly", Some("2026-08-01T14:00:00+05:00"), "correctness_binary", &[0.5]);
        let naive = run("nightly", Some("2026-08-01T09:00:00"), "correctness_binary", &[0.9]);

        let merged = merge(vec![vec![aware], vec![naive]]);

        assert_eq!(merged.len(), 1);
        // Last write wins.
        assert!((merged[0].summary.metrics["correctness_binary"].mean - 0.9).abs() < 1e-9);
    }

    #[test]
    fn merge_orders_missing_timestamps_first_then_chronological() {
        let merged = merge(vec![vec![
            run("late", Some("2026-08-02T00:00:00"), "m", &[1.0]),
            run("early", Some("2026-08-01T00:00:00"), "m", &[1.0]),
            run("undated", None, "m", &[1.0]),
        ]]);

        let names: Vec<_> = merged.iter().map(|r| r.run_name().to_string()).collect();
        assert_eq!(names, vec!["undated", "early", "late"]);
    }

    #[test]
    fn same_name_different_timestamps_are_distinct_runs() {
        let merged = merge(vec![vec![
            run("nightly", Some("2026-08-01T00:00:00"), "m", &[0.1]),
            run("nightly", Some("2026-08-02T00:00:00"), "m", &[0.2]),
        ]]);
        assert_eq!(merged.len(), 2);
        assert_ne!(merged[0].run_id(), merged[1].run_id());
    }

    #[test]
    fn markdown_report_renders_na_for_missing_values() {
        let dir = tempfile::tempdir().unwrap();
        let runs = merge(vec![vec![
            run("alpha", Some("2026-08-01T10:00:00"), "correctness_binary", &[1.0, 0.0]),
            run("beta", Some("2026-08-02T10:00:00"), "faithfulness", &[0.75]),
        ]]);

        let path = write_markdown_report(dir.path(), &runs).unwrap();
        let report = fs::read_to_string(path).unwrap();

        assert!(report.contains("# Evaluation Results Over Time"));
        assert!(report.contains("| Run Name | Mode | Timestamp | Num Questions | Notes |"));
        assert!(report.contains("![All Metrics Combined](eval_all_metrics_combined.png)"));
        assert!(report.contains("### Correctness Binary"));
        assert!(report.contains("![Correctness Binary](eval_metric_correctness_binary.png)"));
        // beta has no correctness_binary score.
        assert!(report.contains("| beta | 2026-08-02 10:00 | N/A |"));
        assert!(report.contains("| alpha | 2026-08-01 10:00 | 0.5000 |"));
    }

    #[test]
    fn collect_local_skips_malformed_summaries() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("run_a");
        fs::create_dir_all(&good).unwrap();
        fs::write(
            good.join("summary.json"),
            serde_json::to_string(&run("a", Some("2026-08-01T00:00:00"), "m", &[1.0]).summary)
                .unwrap(),
        )
        .unwrap();
        let bad = dir.path().join("run_b");
        fs::create_dir_all(&bad).unwrap();
        fs::write(bad.join("summary.json"), "{ not json").unwrap();

        let runs = collect_local(dir.path()).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].run_name(), "a");
    }

    #[test]
    fn aggregate_local_results_merges_with_existing_store() {
        let dir = tempfile::tempdir().unwrap();
        let results = dir.path().join("results");
        let output = dir.path().join("docs");

        let run_dir = results.join("first");
        fs::create_dir_all(&run_dir).unwrap();
        fs::write(
            run_dir.join("summary.json"),
            serde_json::to_string(&run("first", Some("2026-08-01T00:00:00"), "m", &[1.0]).summary)
                .unwrap(),
        )
        .unwrap();

        let outcome = aggregate_local_results(&results, &output).unwrap();
        assert_eq!(outcome.num_runs, 1);

        // A second, different run accumulates; the first survives via the store.
        let run_dir2 = results.join("second");
        fs::create_dir_all(&run_dir2).unwrap();
        fs::write(
            run_dir2.join("summary.json"),
            serde_json::to_string(&run("second", Some("2026-08-02T00:00:00"), "m", &[0.5]).summary)
                .unwrap(),
        )
        .unwrap();

        let outcome = aggregate_local_results(&results, &output).unwrap();
        assert_eq!(outcome.num_runs, 2);
        // Re-running is idempotent.
        let outcome = aggregate_local_results(&results, &output).unwrap();
        assert_eq!(outcome.num_runs, 2);
    }
}
