//! Judge-model boundary.
//!
//! A judge is a single-prompt, single-response text completion used only to
//! score or decompose text. Providers often wrap the requested JSON in prose
//! or a fenced code block, so extraction is lenient: a fenced block is tried
//! first, then the first balanced brace- or bracket-delimited region.

pub mod openai;

use crate::error::JudgeResult;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

pub use openai::OpenAiJudge;

/// A text-completion capability used purely for scoring.
#[async_trait]
pub trait JudgeModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn complete(&self, prompt: &str) -> JudgeResult<String>;
}

lazy_static! {
    static ref FENCED_BLOCK: Regex =
        Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").expect("static regex");
}

/// Extract a JSON object from possibly prose-wrapped judge output.
pub fn extract_json_object(content: &str) -> Option<Value> {
    extract_json_value(content, '{', '}').filter(Value::is_object)
}

/// Extract a JSON array from possibly prose-wrapped judge output.
pub fn extract_json_array(content: &str) -> Option<Value> {
    extract_json_value(content, '[', ']').filter(Value::is_array)
}

fn extract_json_value(content: &str, open: char, close: char) -> Option<Value> {
    if let Some(captures) = FENCED_BLOCK.captures(content) {
        let inner = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
        if let Some(value) = parse_balanced_region(inner, open, close) {
            return Some(value);
        }
    }
    parse_balanced_region(content, open, close)
}

/// Parse the first balanced `open`..`close` region, respecting strings.
fn parse_balanced_region(content: &str, open: char, close: char) -> Option<Value> {
    let start = content.find(open)?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in content[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            c if c == open && !in_string => depth += 1,
            c if c == close && !in_string => {
                depth -= 1;
                if depth == 0 {
                    let candidate = &content[start..start + offset + ch.len_utf8()];
                    return serde_json::from_str(candidate).ok();
                }
            }
            _ => {}
        }
    }
    None
}

/// Truncate raw judge output for log lines.
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let mut truncated: String = text.chars().take(max_chars).collect();
        truncated.push_str("...");
        truncated
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::JudgeModel;
    use crate::error::{JudgeError, JudgeResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replays canned responses keyed by a substring of the prompt,
    /// recording every prompt it receives.
    pub(crate) struct ScriptedJudge {
        responses: Vec<(String, String)>,
        fallback: Option<String>,
        pub prompts: Mutex<Vec<String>>,
        pub calls: AtomicUsize,
    }

    impl ScriptedJudge {
        pub fn new() -> Self {
            Self {
                responses: Vec::new(),
                fallback: None,
                prompts: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn respond_when(mut self, prompt_contains: &str, response: &str) -> Self {
            self.responses
                .push((prompt_contains.to_string(), response.to_string()));
            self
        }

        pub fn respond_always(mut self, response: &str) -> Self {
            self.fallback = Some(response.to_string());
            self
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl JudgeModel for ScriptedJudge {
        fn model_name(&self) -> &str {
            "scripted-judge"
        }

        async fn complete(&self, prompt: &str) -> JudgeResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_string());
            for (needle, response) in &self.responses {
                if prompt.contains(needle) {
                    return Ok(response.clone());
                }
            }
            match &self.fallback {
                Some(response) => Ok(response.clone()),
                None => Err(JudgeError::ApiError(format!(
                    "no scripted response for prompt: {}",
                    super::truncate(prompt, 80)
                ))),
            }
        }
    }
}
