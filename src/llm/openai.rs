use std::env;

use async_openai::error::OpenAIError;
use async_openai::types::{CreateChatCompletionRequest, CreateChatCompletionResponse};
use async_openai::{config::OpenAIConfig, Client};
use async_trait::async_trait;

use crate::config::PilotConfig;

use super::error::PilotLlmError;
use super::provider::ChatCompletionProvider;

/// [`ChatCompletionProvider`] backed by any OpenAI-compatible endpoint.
///
/// Non-OpenAI providers from the capability matrix are reached the same way
/// through their compatible APIs by pointing `api_base` at them.
#[derive(Clone, Debug)]
pub struct OpenAiChatProvider {
    client: Client<OpenAIConfig>,
}

impl OpenAiChatProvider {
    /// Wrap an existing `async-openai` client instance.
    pub fn new(client: Client<OpenAIConfig>) -> Self {
        Self { client }
    }

    /// Construct a client from webpilot configuration values.
    pub fn from_config(config: &PilotConfig) -> Result<Self, PilotLlmError> {
        let api_key = config
            .model_api_key
            .clone()
            .or_else(|| env::var("MODEL_API_KEY").ok())
            .or_else(|| env::var("OPENAI_API_KEY").ok())
            .ok_or(PilotLlmError::MissingApiKey)?;

        let mut openai_config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(api_base) = config.api_base.as_deref() {
            openai_config = openai_config.with_api_base(api_base);
        }

        Ok(Self::new(Client::with_config(openai_config)))
    }
}

#[async_trait]
impl ChatCompletionProvider for OpenAiChatProvider {
    async fn create_chat_completion(
        &self,
        request: CreateChatCompletionRequest,
    ) -> Result<CreateChatCompletionResponse, OpenAIError> {
        self.client.chat().create(request).await
    }
}
