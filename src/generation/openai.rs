//! OpenAI chat-completion text generator.

use super::TextGenerator;
use crate::config::Settings;
use crate::error::{KapitelError, Result};
use crate::openai::{client_from_settings, default_client};
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use tracing::{debug, instrument};

/// OpenAI-backed text generator.
pub struct OpenAIGenerator {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    model: String,
    temperature: f32,
}

impl OpenAIGenerator {
    /// Create a generator with the default model.
    pub fn new() -> Self {
        Self::with_model("gpt-4o-mini")
    }

    /// Create a generator with a custom model.
    pub fn with_model(model: &str) -> Self {
        Self {
            client: default_client(),
            model: model.to_string(),
            temperature: 0.3,
        }
    }

    /// Create a generator from configuration, honoring the request timeout.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            client: client_from_settings(settings),
            model: settings.generation.model.clone(),
            temperature: settings.generation.temperature,
        }
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

impl Default for OpenAIGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextGenerator for OpenAIGenerator {
    #[instrument(skip(self, system, user))]
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system)
                .build()
                .map_err(|e| KapitelError::Generation(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(user)
                .build()
                .map_err(|e| KapitelError::Generation(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(self.temperature)
            .build()
            .map_err(|e| KapitelError::Generation(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| KapitelError::OpenAI(format!("Chat completion failed: {}", e)))?;

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| KapitelError::Generation("Empty response from LLM".to_string()))?;

        debug!("Generated {} chars", content.len());
        Ok(content)
    }
}
