use thiserror::Error;

use async_openai::error::OpenAIError;

/// Errors surfaced by the model client layer.
#[derive(Debug, Error)]
pub enum PilotLlmError {
    #[error("missing API key; set MODEL_API_KEY or OPENAI_API_KEY")]
    MissingApiKey,
    #[error("missing default model configuration")]
    MissingDefaultModel,
    #[error("invalid chat completion request: {0}")]
    InvalidRequest(String),
    #[error("invalid conversation message: {0}")]
    InvalidMessage(String),
    #[error(transparent)]
    OpenAi(#[from] OpenAIError),
}
