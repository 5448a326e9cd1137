use crate::config::JudgeConfig;
use crate::error::{JudgeError, JudgeResult};
use crate::judge::JudgeModel;
use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestUserMessage,
        ChatCompletionRequestUserMessageContent, CreateChatCompletionRequest,
    },
    Client,
};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

/// OpenAI chat-completion judge backend.
pub struct OpenAiJudge {
    client: Client<OpenAIConfig>,
    config: JudgeConfig,
}

impl OpenAiJudge {
    pub fn new(config: JudgeConfig, api_key: SecretString) -> Self {
        let openai_config = OpenAIConfig::new().with_api_key(api_key.expose_secret());
        Self {
            client: Client::with_config(openai_config),
            config,
        }
    }

    /// Build the judge from its configured environment variable.
    pub fn from_env(config: JudgeConfig) -> JudgeResult<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            JudgeError::Authentication(format!(
                "missing judge api key in env var {}",
                config.api_key_env
            ))
        })?;
        Ok(Self::new(config, SecretString::new(Box::from(api_key))))
    }

    #[tracing::instrument(skip(self, prompt))]
    async fn chat_completion(&self, prompt: &str) -> JudgeResult<String> {
        debug!(chars = prompt.chars().count(), "sending judge prompt");

        let messages = vec![ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessage {
                content: ChatCompletionRequestUserMessageContent::Text(prompt.to_string()),
                name: None,
            },
        )];

        let request = CreateChatCompletionRequest {
            model: self.config.model.clone(),
            messages,
            temperature: Some(self.config.temperature),
            max_completion_tokens: Some(self.config.max_tokens as u32),
            ..Default::default()
        };

        let chat = self.client.chat();
        let call = chat.create(request);
        let response = tokio::time::timeout(self.config.request_timeout, call)
            .await
            .map_err(|_| JudgeError::Timeout(self.config.request_timeout))?
            .map_err(|e| JudgeError::ApiError(e.to_string()))?;

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| JudgeError::ApiError("No response content".into()))
    }
}

impl std::fmt::Debug for OpenAiJudge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiJudge").field("model", &self.config.model).finish()
    }
}

#[async_trait]
impl JudgeModel for OpenAiJudge {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    async fn complete(&self, prompt: &str) -> JudgeResult<String> {
        self.chat_completion(prompt).await
    }
}
