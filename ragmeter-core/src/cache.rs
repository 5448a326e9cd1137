//! CSV-backed cache for generated answers.
//!
//! Each row stores one sample's generation as
//! `sample_id,answer,contexts,raw` where `contexts` and `raw` are JSON
//! encoded. A run resumes by generating only the samples absent from
//! the cache, then re-saves the merged set. Concurrent writers are not
//! coordinated; callers are expected to run one evaluation per cache
//! file at a time.

use crate::dataset::EvalSample;
use crate::error::{EvalError, EvalResult};
use crate::generation::GeneratedOutput;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Serialize, Deserialize)]
struct CacheRow {
    sample_id: String,
    answer: String,
    contexts: String,
    raw: String,
}

#[derive(Debug, Clone)]
pub struct ResultCache {
    path: PathBuf,
}

impl ResultCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads cached generations. Returns `None` when the cache file
    /// does not exist, as opposed to an existing but partial cache.
    pub fn load(&self) -> EvalResult<Option<HashMap<String, GeneratedOutput>>> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no answer cache present");
            return Ok(None);
        }

        let mut reader = csv::Reader::from_path(&self.path)?;
        let mut cached = HashMap::new();
        for row in reader.deserialize() {
            let row: CacheRow = row?;
            let output = GeneratedOutput {
                answer: row.answer,
                contexts: serde_json::from_str(&row.contexts)?,
                raw: serde_json::from_str(&row.raw)?,
            };
            cached.insert(row.sample_id, output);
        }
        info!(path = %self.path.display(), entries = cached.len(), "loaded answer cache");
        Ok(Some(cached))
    }

    /// Writes all outputs present for `samples`, in sample order.
    /// Samples without an output are skipped, so a partial batch can be
    /// saved and completed later.
    pub fn save(
        &self,
        samples: &[EvalSample],
        outputs: &HashMap<String, GeneratedOutput>,
    ) -> EvalResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut writer = csv::Writer::from_path(&self.path)?;
        let mut written = 0usize;
        for sample in samples {
            let Some(output) = outputs.get(&sample.sample_id) else {
                continue;
            };
            writer.serialize(CacheRow {
                sample_id: sample.sample_id.clone(),
                answer: output.answer.clone(),
                contexts: serde_json::to_string(&output.contexts)?,
                raw: serde_json::to_string(&output.raw)?,
            })?;
            written += 1;
        }
        writer.flush().map_err(EvalError::from)?;
        info!(path = %self.path.display(), entries = written, "saved answer cache");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample(id: &str) -> EvalSample {
        EvalSample {
            sample_id: id.to_string(),
            input: format!("question {id}"),
            human_reference_answer: "ref".to_string(),
            human_reference_citation: None,
            source: None,
            metadata: Default::default(),
        }
    }

    fn output(answer: &str) -> GeneratedOutput {
        GeneratedOutput {
            answer: answer.to_string(),
            contexts: vec!["first context".to_string(), "second, with comma".to_string()],
            raw: json!({"model_id": "m-1", "nested": {"tokens": [1, 2, 3]}}),
        }
    }

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResultCache::new(dir.path().join("answers.csv"));
        assert!(cache.load().unwrap().is_none());
    }

    #[test]
    fn round_trips_nested_structures() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResultCache::new(dir.path().join("answers.csv"));

        let samples = vec![sample("a"), sample("b")];
        let mut outputs = HashMap::new();
        outputs.insert("a".to_string(), output("answer a"));
        outputs.insert("b".to_string(), output("answer \"quoted\" b"));

        cache.save(&samples, &outputs).unwrap();
        let loaded = cache.load().unwrap().unwrap();

        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded["a"], outputs["a"]);
        assert_eq!(loaded["b"], outputs["b"]);
    }

    #[test]
    fn partial_save_then_merged_resave() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResultCache::new(dir.path().join("answers.csv"));
        let samples = vec![sample("a"), sample("b"), sample("c")];

        let mut outputs = HashMap::new();
        outputs.insert("b".to_string(), output("answer b"));
        cache.save(&samples, &outputs).unwrap();
        assert_eq!(cache.load().unwrap().unwrap().len(), 1);

        outputs.insert("a".to_string(), output("answer a"));
        outputs.insert("c".to_string(), output("answer c"));
        cache.save(&samples, &outputs).unwrap();

        let loaded = cache.load().unwrap().unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded["b"].answer, "answer b");
    }

    #[test]
    fn resave_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("answers.csv");
        let cache = ResultCache::new(&path);
        let samples = vec![sample("a"), sample("b")];
        let mut outputs = HashMap::new();
        outputs.insert("a".to_string(), output("answer a"));
        outputs.insert("b".to_string(), output("answer b"));

        cache.save(&samples, &outputs).unwrap();
        let first = std::fs::read_to_string(&path).unwrap();
        cache.save(&samples, &outputs).unwrap();
        let second = std::fs::read_to_string(&path).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResultCache::new(dir.path().join("deep/nested/answers.csv"));
        let samples = vec![sample("a")];
        let mut outputs = HashMap::new();
        outputs.insert("a".to_string(), output("answer a"));
        cache.save(&samples, &outputs).unwrap();
        assert!(cache.load().unwrap().is_some());
    }
}
