//! Text-generation backends.
//!
//! Each role, and the emotion classifier, holds its own backend handle. The
//! handles are built by the caller and injected into the orchestrator.

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestUserMessage,
    CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use log::warn;
use std::time::Duration;

use crate::error::DialogueError;

/// Capability: turn a prompt into text.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generate a reply for a single prompt.
    async fn generate(&self, prompt: &str) -> Result<String, DialogueError>;

    /// Model identifier, for logs.
    fn model(&self) -> &str;
}

/// Connection settings for an OpenAI-compatible API.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// OpenAI-compatible API base URL.
    pub api_base: String,
    /// API key for authentication.
    pub api_key: String,
}

impl ApiConfig {
    pub fn new(api_base: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            api_key: api_key.into(),
        }
    }
}

/// Generation backend for OpenAI-compatible chat completion endpoints.
pub struct OpenAiBackend {
    client: Client<OpenAIConfig>,
    model: String,
    max_retries: u32,
}

impl OpenAiBackend {
    pub fn new(api: &ApiConfig, model: impl Into<String>) -> Result<Self, DialogueError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                DialogueError::ConfigError(format!("Failed to create HTTP client: {}", e))
            })?;

        let config = OpenAIConfig::new()
            .with_api_key(&api.api_key)
            .with_api_base(&api.api_base);

        Ok(Self {
            client: Client::with_config(config).with_http_client(http_client),
            model: model.into(),
            max_retries: 3,
        })
    }
}

#[async_trait]
impl GenerationBackend for OpenAiBackend {
    /// Single-message completion with exponential backoff on API errors.
    async fn generate(&self, prompt: &str) -> Result<String, DialogueError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(vec![ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessage {
                    content: prompt.to_string().into(),
                    name: None,
                },
            )])
            .build()?;

        let mut last_error = None;

        for attempt in 0..self.max_retries {
            if attempt > 0 {
                // 2s, 4s
                tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
            }

            match self.client.chat().create(request.clone()).await {
                Ok(response) => {
                    let content = response
                        .choices
                        .first()
                        .and_then(|c| c.message.content.clone())
                        .unwrap_or_default();
                    return Ok(content);
                }
                Err(e) => {
                    warn!(
                        "[{}] completion attempt {}/{} failed: {}",
                        self.model,
                        attempt + 1,
                        self.max_retries,
                        e
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.map(DialogueError::from).unwrap_or_else(|| {
            DialogueError::ConfigError("Unknown API error after retries".to_string())
        }))
    }

    fn model(&self) -> &str {
        &self.model
    }
}
