use crate::dataset::EvalSample;
use crate::error::{EvalError, EvalResult};
use crate::generation::{AnswerClient, GeneratedOutput};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

/// Remote chat backend reached over HTTP.
///
/// Sends `{message, conversation_id, user_id[, retrieval_filters]}` and
/// expects a ChatResponse body: `answer` plus `sources`, each source
/// carrying the retrieved `chunk`. A function-invocation envelope
/// (`statusCode` + JSON-encoded `body`) is unwrapped transparently.
pub struct HttpAnswerClient {
    endpoint: String,
    user_id: String,
    client: reqwest::Client,
}

impl HttpAnswerClient {
    pub fn new(endpoint: String, user_id: String) -> Self {
        Self {
            endpoint,
            user_id,
            client: reqwest::Client::new(),
        }
    }

    fn build_payload(&self, sample: &EvalSample) -> Value {
        let conversation_id = sample
            .metadata
            .get("conversation_id")
            .cloned()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let user_id = sample
            .metadata
            .get("user_id")
            .cloned()
            .unwrap_or_else(|| self.user_id.clone());

        let mut payload = json!({
            "message": sample.input,
            "conversation_id": conversation_id,
            "user_id": user_id,
        });

        if let Some(filters) = sample.metadata.get("retrieval_filters") {
            // Filters may be a JSON fragment or a plain tag.
            payload["retrieval_filters"] =
                serde_json::from_str(filters).unwrap_or_else(|_| Value::String(filters.clone()));
        }

        payload
    }

    fn generation_error(sample: &EvalSample, message: impl Into<String>) -> EvalError {
        EvalError::Generation {
            sample_id: sample.sample_id.clone(),
            message: message.into(),
        }
    }

    fn unwrap_envelope(sample: &EvalSample, body: Value) -> EvalResult<Value> {
        let Some(status) = body.get("statusCode").and_then(Value::as_i64) else {
            return Ok(body);
        };
        if status != 200 {
            return Err(Self::generation_error(
                sample,
                format!("backend error: {}", body.get("body").map(Value::to_string).unwrap_or_default()),
            ));
        }
        match body.get("body") {
            Some(Value::String(inner)) => serde_json::from_str(inner)
                .map_err(|e| Self::generation_error(sample, format!("invalid body payload: {e}"))),
            Some(inner) => Ok(inner.clone()),
            None => Ok(body),
        }
    }
}

#[async_trait]
impl AnswerClient for HttpAnswerClient {
    async fn generate(&self, sample: &EvalSample) -> EvalResult<GeneratedOutput> {
        let payload = self.build_payload(sample);
        debug!(sample_id = %sample.sample_id, endpoint = %self.endpoint, "generating answer");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Self::generation_error(sample, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::generation_error(sample, format!("backend returned {status}")));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| Self::generation_error(sample, format!("invalid response body: {e}")))?;
        let body = Self::unwrap_envelope(sample, body)?;

        let answer = body
            .get("answer")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let contexts = body
            .get("sources")
            .and_then(Value::as_array)
            .map(|sources| {
                sources
                    .iter()
                    .filter_map(|s| s.get("chunk").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(GeneratedOutput {
            answer,
            contexts,
            raw: body,
        })
    }
}
