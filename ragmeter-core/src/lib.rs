//! # ragmeter: RAG Evaluation Engine
//!
//! ragmeter measures the answer quality of retrieval-augmented
//! generation backends and tracks it across runs.
//!
//! ## Evaluation Flow
//!
//! A single run moves through a fixed pipeline:
//!
//! ```text
//! Dataset → Generation (cached) → Metrics → Aggregation → Artifacts
//! ```
//!
//! - Datasets of questions with human reference answers load from CSV
//!   ([`dataset`]).
//! - Answers come from a pluggable backend ([`generation`]), generated
//!   concurrently with order preserved and resumable through a CSV
//!   cache ([`cache`]).
//! - Scoring strategies grade each answer with an LLM judge
//!   ([`metrics`], [`judge`]), from binary correctness up to atomic
//!   fact decomposition and RAGAS-style semantic dimensions.
//! - Per-metric score distributions collapse to summary statistics
//!   with bootstrap confidence intervals ([`stats`]).
//! - Artifacts are written per run ([`report`]) and folded into
//!   longitudinal reports across runs ([`aggregate`]).
//!
//! Judge reliability itself is measurable against human-labeled
//! answers ([`validation`]).
//!
//! The [`pipeline`] module ties a run together; [`config`] holds the
//! JSON configuration surface shared by the library and the CLI.

pub mod aggregate;
pub mod cache;
pub mod config;
pub mod dataset;
pub mod error;
pub mod generation;
pub mod judge;
pub mod metrics;
pub mod pipeline;
pub mod report;
pub mod stats;
pub mod timestamp;
pub mod validation;

// Re-exports
pub use config::EvalConfig;
pub use error::*;
pub use pipeline::EvalPipeline;
pub use report::{RunMetadata, RunSummary};

#[cfg(test)]
mod tests {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    #[ctor::ctor]
    fn init_tests() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}
