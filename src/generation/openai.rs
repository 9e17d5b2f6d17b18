//! Chat-completions generator for OpenAI-compatible endpoints (Groq by default).

use super::{GenerationRequest, Generator};
use crate::config::GenerationSettings;
use crate::error::{DocQaError, Result};
use crate::openai::{create_client_with_timeout, Endpoint};
use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, instrument};

/// Generator backed by a `/chat/completions` endpoint.
pub struct OpenAIGenerator {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: f32,
}

impl OpenAIGenerator {
    /// Create a generator from settings. Fails if the API key is missing.
    pub fn new(settings: &GenerationSettings) -> Result<Self> {
        let endpoint = Endpoint {
            api_base: settings.api_base.clone(),
            api_key_env: settings.api_key_env.clone(),
        };

        Ok(Self {
            client: create_client_with_timeout(
                &endpoint,
                Duration::from_secs(settings.timeout_secs),
            )?,
            model: settings.model.clone(),
            temperature: settings.temperature,
        })
    }

    fn messages(request: &GenerationRequest) -> Result<Vec<ChatCompletionRequestMessage>> {
        Ok(vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(request.system.clone())
                .build()
                .map_err(|e| DocQaError::Generation(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(request.user.clone())
                .build()
                .map_err(|e| DocQaError::Generation(e.to_string()))?
                .into(),
        ])
    }
}

#[async_trait]
impl Generator for OpenAIGenerator {
    #[instrument(skip(self, request), fields(model = %self.model))]
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(Self::messages(request)?)
            .temperature(self.temperature)
            .build()
            .map_err(|e| DocQaError::Generation(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(chat_request)
            .await
            .map_err(|e| DocQaError::OpenAI(format!("Failed to generate response: {}", e)))?;

        let answer = response
            .choices
            .first()
            .and_then(|c| c.message.content.as_ref())
            .ok_or_else(|| DocQaError::Generation("Empty response from model".to_string()))?
            .clone();

        debug!("Generated {} characters", answer.len());
        Ok(answer)
    }

    fn model(&self) -> &str {
        &self.model
    }
}
