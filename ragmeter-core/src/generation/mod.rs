//! Answer-generation boundary.
//!
//! The engine never produces answers itself; it drives an [`AnswerClient`]
//! backend selected by `run.mode`. Backends are resolved through an explicit
//! constructor registry at configuration time, so an unsupported selector
//! fails before any generation starts. The built-in `http` backend posts to
//! a chat endpoint; embedders register in-process backends the same way.

pub mod batch;
pub mod http;

use crate::config::EvalConfig;
use crate::dataset::EvalSample;
use crate::error::{EvalError, EvalResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

pub use batch::run_batch;
pub use http::HttpAnswerClient;

/// One answer produced for a sample.
///
/// `raw` preserves the backend's full response so downstream writers can
/// recover config and model metadata without the boundary widening.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedOutput {
    pub answer: String,
    pub contexts: Vec<String>,
    #[serde(default)]
    pub raw: Value,
}

/// An answer-generation backend.
#[async_trait]
pub trait AnswerClient: Send + Sync {
    async fn generate(&self, sample: &EvalSample) -> EvalResult<GeneratedOutput>;
}

type ClientConstructor = Box<dyn Fn(&EvalConfig) -> EvalResult<Box<dyn AnswerClient>> + Send + Sync>;

/// Backend-identifier to constructor map.
pub struct ClientRegistry {
    constructors: HashMap<String, ClientConstructor>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Registry with the built-in backends.
    pub fn with_default_backends() -> Self {
        let mut registry = Self::new();
        registry.register("http", |config| {
            let endpoint = config.generation.endpoint.clone().ok_or_else(|| {
                EvalError::Config("run.mode 'http' requires generation.endpoint".to_string())
            })?;
            Ok(Box::new(HttpAnswerClient::new(endpoint, config.generation.user_id.clone()))
                as Box<dyn AnswerClient>)
        });
        registry
    }

    pub fn register<F>(&mut self, mode: &str, constructor: F)
    where
        F: Fn(&EvalConfig) -> EvalResult<Box<dyn AnswerClient>> + Send + Sync + 'static,
    {
        self.constructors.insert(mode.to_string(), Box::new(constructor));
    }

    /// Resolve `run.mode`; unknown selectors are a configuration error.
    pub fn build(&self, config: &EvalConfig) -> EvalResult<Box<dyn AnswerClient>> {
        let constructor = self.constructors.get(&config.run.mode).ok_or_else(|| {
            EvalError::Config(format!("unknown run.mode: {}", config.run.mode))
        })?;
        constructor(config)
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::with_default_backends()
    }
}
