//! Flattened CSV store of historical run summaries.
//!
//! One row per run: the run metadata columns followed by a
//! `<metric>_<stat>` column per metric statistic. NaN statistics are
//! stored as empty cells and come back as NaN.

use crate::aggregate::HistoricalRun;
use crate::error::{AggregateError, AggregateResult};
use crate::report::{RunMetadata, RunSummary};
use crate::stats::MetricSummary;
use crate::timestamp;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::info;

const META_COLUMNS: [&str; 5] = [
    "evaluation_run_name",
    "mode",
    "run_timestamp",
    "num_validation_questions",
    "notes",
];

pub const STAT_NAMES: [&str; 7] = ["mean", "std", "median", "min", "max", "ci_lower", "ci_upper"];

fn stat_value(summary: &MetricSummary, stat: &str) -> f64 {
    match stat {
        "mean" => summary.mean,
        "std" => summary.std,
        "median" => summary.median,
        "min" => summary.min,
        "max" => summary.max,
        "ci_lower" => summary.ci_lower,
        "ci_upper" => summary.ci_upper,
        _ => f64::NAN,
    }
}

fn set_stat(summary: &mut MetricSummary, stat: &str, value: f64) {
    match stat {
        "mean" => summary.mean = value,
        "std" => summary.std = value,
        "median" => summary.median = value,
        "min" => summary.min = value,
        "max" => summary.max = value,
        "ci_lower" => summary.ci_lower = value,
        "ci_upper" => summary.ci_upper = value,
        _ => {}
    }
}

/// Splits a flattened column name into metric and stat. Stat names can
/// contain underscores, so the split matches known stat suffixes
/// instead of the last underscore.
fn split_column(column: &str) -> Option<(&str, &str)> {
    for stat in STAT_NAMES {
        if let Some(metric) = column.strip_suffix(stat) {
            if let Some(metric) = metric.strip_suffix('_') {
                if !metric.is_empty() {
                    return Some((metric, stat));
                }
            }
        }
    }
    None
}

pub fn save(path: &Path, runs: &[HistoricalRun]) -> AggregateResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // Union of metric columns across all runs, in stable order.
    let mut metric_columns: BTreeSet<String> = BTreeSet::new();
    for run in runs {
        for metric in run.summary.metrics.keys() {
            for stat in STAT_NAMES {
                metric_columns.insert(format!("{metric}_{stat}"));
            }
        }
    }

    let mut writer = csv::Writer::from_path(path)?;
    let mut header: Vec<&str> = META_COLUMNS.to_vec();
    header.extend(metric_columns.iter().map(String::as_str));
    writer.write_record(&header)?;

    for run in runs {
        let mut record: Vec<String> = vec![
            run.summary.run.evaluation_run_name.clone(),
            run.summary.run.mode.clone(),
            run.summary.run.run_timestamp.clone().unwrap_or_default(),
            run.summary
                .num_validation_questions
                .map(|n| n.to_string())
                .unwrap_or_default(),
            run.summary.run.notes.clone().unwrap_or_default(),
        ];
        for column in &metric_columns {
            let cell = split_column(column)
                .and_then(|(metric, stat)| {
                    run.summary
                        .metrics
                        .get(metric)
                        .map(|summary| stat_value(summary, stat))
                })
                .filter(|value| !value.is_nan())
                .map(|value| value.to_string())
                .unwrap_or_default();
            record.push(cell);
        }
        writer.write_record(&record)?;
    }
    writer.flush().map_err(AggregateError::from)?;
    info!(path = %path.display(), runs = runs.len(), "saved aggregated results store");
    Ok(())
}

pub fn load(path: &Path) -> AggregateResult<Vec<HistoricalRun>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let mut reader = csv::Reader::from_path(path)?;
    let header: Vec<String> = reader
        .headers()?
        .iter()
        .map(str::to_string)
        .collect();

    let mut runs = Vec::new();
    for row in reader.records() {
        let row = row?;
        let cell = |name: &str| -> Option<&str> {
            header
                .iter()
                .position(|h| h == name)
                .and_then(|i| row.get(i))
        };
        let non_empty = |name: &str| -> Option<String> {
            cell(name).filter(|v| !v.is_empty()).map(str::to_string)
        };

        let mut metrics: BTreeMap<String, MetricSummary> = BTreeMap::new();
        for (i, column) in header.iter().enumerate() {
            let Some((metric, stat)) = split_column(column) else {
                continue;
            };
            // A fully empty metric stays absent rather than all-NaN.
            let Some(value) = row
                .get(i)
                .filter(|v| !v.is_empty())
                .and_then(|v| v.parse::<f64>().ok())
            else {
                continue;
            };
            set_stat(
                metrics
                    .entry(metric.to_string())
                    .or_insert_with(MetricSummary::empty),
                stat,
                value,
            );
        }

        let run_timestamp = non_empty("run_timestamp");
        let timestamp = run_timestamp.as_deref().and_then(timestamp::parse_normalized);
        runs.push(HistoricalRun {
            summary: RunSummary {
                metrics,
                run: RunMetadata {
                    evaluation_run_name: non_empty("evaluation_run_name").unwrap_or_default(),
                    mode: non_empty("mode").unwrap_or_default(),
                    run_timestamp,
                    notes: non_empty("notes"),
                },
                num_validation_questions: cell("num_validation_questions")
                    .and_then(|v| v.parse().ok()),
                judge_validation: None,
            },
            timestamp,
            source_path: Some(path.to_path_buf()),
        });
    }
    info!(path = %path.display(), runs = runs.len(), "loaded aggregated results store");
    Ok(runs)
}
