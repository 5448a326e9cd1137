//! Error taxonomy for the evaluation engine.
//!
//! Three broad classes of failure exist, with different policies:
//! - configuration errors are fatal and raised before any expensive work,
//! - generation errors abort the run (no partial summary is emitted),
//! - judge-response *parse* errors are recovered inside each metric and
//!   never surface here; only judge transport errors do.

use std::time::Duration;
use thiserror::Error;

/// Errors raised while talking to a judge model.
#[derive(Debug, Error)]
pub enum JudgeError {
    #[error("authentication error: {0}")]
    Authentication(String),

    #[error("api error: {0}")]
    ApiError(String),

    #[error("judge call timed out after {0:?}")]
    Timeout(Duration),
}

pub type JudgeResult<T> = Result<T, JudgeError>;

/// Errors raised during a single evaluation run.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Any sample failing generation is fatal to the whole run.
    #[error("generation failed for sample '{sample_id}': {message}")]
    Generation { sample_id: String, message: String },

    #[error(transparent)]
    Judge(#[from] JudgeError),
}

pub type EvalResult<T> = Result<T, EvalError>;

/// Errors raised while aggregating historical runs.
///
/// Most of these are logged and the affected unit is skipped; only store
/// persistence failures abort the sweep.
#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("http error: {0}")]
    Http(String),
}

pub type AggregateResult<T> = Result<T, AggregateError>;
