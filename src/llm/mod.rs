//! Language model client layer.
//!
//! Houses the provider-agnostic chat client, an OpenAI-compatible provider
//! implementation powered by `async-openai`, and the two action-extraction
//! strategies the control loops select between.

pub mod client;
pub mod error;
pub mod openai;
pub mod parse;
pub mod provider;

pub use client::{to_request_messages, ChatCompletionOptions, MetricsCallback, PilotLlmClient};
pub use error::PilotLlmError;
pub use openai::OpenAiChatProvider;
pub use parse::{ActionParser, FencedJsonParser, ModelReply, StructuredParser};
pub use provider::ChatCompletionProvider;
