use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestAssistantMessageContent,
    ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImageArgs,
    ChatCompletionRequestMessageContentPartTextArgs, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessageArgs,
    ChatCompletionRequestUserMessageContent, ChatCompletionRequestUserMessageContentPart,
    ChatCompletionTool, ChatCompletionToolChoiceOption, CreateChatCompletionRequest,
    CreateChatCompletionRequestArgs, CreateChatCompletionResponse, ImageUrlArgs, ResponseFormat,
};

use crate::config::{LoggerCallback, PilotConfig};
use crate::types::{ChatRole, ContentPart, ConversationMessage, MessageContent};

use super::error::PilotLlmError;
use super::openai::OpenAiChatProvider;
use super::provider::ChatCompletionProvider;

/// Callback invoked after a successful completion to capture metrics.
pub type MetricsCallback =
    Arc<dyn Fn(&CreateChatCompletionResponse, Duration, Option<&str>) + Send + Sync + 'static>;

/// Optional parameters that influence chat completion requests.
#[derive(Debug, Default, Clone)]
pub struct ChatCompletionOptions {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_completion_tokens: Option<u32>,
    pub response_format: Option<ResponseFormat>,
    pub tools: Option<Vec<ChatCompletionTool>>,
    pub tool_choice: Option<ChatCompletionToolChoiceOption>,
    pub parallel_tool_calls: Option<bool>,
}

/// Provider-neutral chat completion client used by both control loops.
pub struct PilotLlmClient<P: ChatCompletionProvider> {
    provider: P,
    default_model: String,
    logger: Option<LoggerCallback>,
    metrics_callback: Option<MetricsCallback>,
}

impl<P> fmt::Debug for PilotLlmClient<P>
where
    P: ChatCompletionProvider + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PilotLlmClient")
            .field("provider", &self.provider)
            .field("default_model", &self.default_model)
            .field("logger_attached", &self.logger.is_some())
            .field("metrics_callback", &self.metrics_callback.is_some())
            .finish()
    }
}

impl<P: ChatCompletionProvider> PilotLlmClient<P> {
    pub fn new(default_model: impl Into<String>, provider: P) -> Self {
        Self {
            provider,
            default_model: default_model.into(),
            logger: None,
            metrics_callback: None,
        }
    }

    pub fn with_logger(mut self, logger: Option<LoggerCallback>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_metrics_callback(mut self, callback: Option<MetricsCallback>) -> Self {
        self.metrics_callback = callback;
        self
    }

    pub fn set_logger(&mut self, logger: Option<LoggerCallback>) {
        self.logger = logger;
    }

    pub fn set_metrics_callback(&mut self, callback: Option<MetricsCallback>) {
        self.metrics_callback = callback;
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Build an [`async_openai`] request from a conversation transcript.
    pub fn build_request(
        &self,
        messages: &[ConversationMessage],
        options: ChatCompletionOptions,
    ) -> Result<CreateChatCompletionRequest, PilotLlmError> {
        let model = options
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());
        if model.trim().is_empty() {
            return Err(PilotLlmError::MissingDefaultModel);
        }

        let mut builder = CreateChatCompletionRequestArgs::default();
        builder.model(model);
        builder.messages(to_request_messages(messages)?);
        if let Some(temperature) = options.temperature {
            builder.temperature(temperature);
        }
        if let Some(max_completion_tokens) = options.max_completion_tokens {
            builder.max_completion_tokens(max_completion_tokens);
        }
        if let Some(response_format) = options.response_format {
            builder.response_format(response_format);
        }
        if let Some(tools) = options.tools {
            builder.tools(tools);
        }
        if let Some(tool_choice) = options.tool_choice {
            builder.tool_choice(tool_choice);
        }
        if let Some(parallel_tool_calls) = options.parallel_tool_calls {
            builder.parallel_tool_calls(parallel_tool_calls);
        }

        builder
            .build()
            .map_err(|err| PilotLlmError::InvalidRequest(err.to_string()))
    }

    /// Send a conversation to the provider and return the raw response.
    pub async fn create_chat_completion(
        &self,
        messages: &[ConversationMessage],
        options: ChatCompletionOptions,
        function_name: Option<&str>,
    ) -> Result<CreateChatCompletionResponse, PilotLlmError> {
        let request = self.build_request(messages, options)?;
        self.execute_request(request, function_name).await
    }

    async fn execute_request(
        &self,
        request: CreateChatCompletionRequest,
        function_name: Option<&str>,
    ) -> Result<CreateChatCompletionResponse, PilotLlmError> {
        let model = request.model.clone();
        self.log_debug(&format!(
            "sending chat completion: model={} function={}",
            model,
            function_name.unwrap_or("n/a")
        ));

        let start = Instant::now();
        match self.provider.create_chat_completion(request).await {
            Ok(response) => {
                let elapsed = start.elapsed();
                if let Some(callback) = &self.metrics_callback {
                    callback(&response, elapsed, function_name);
                }
                self.log_debug(&format!(
                    "chat completion succeeded: model={} duration={}ms",
                    model,
                    elapsed.as_millis()
                ));
                Ok(response)
            }
            Err(err) => {
                self.log_error(&format!("chat completion failed for model={model}: {err}"));
                Err(PilotLlmError::OpenAi(err))
            }
        }
    }

    fn log_debug(&self, message: &str) {
        if let Some(logger) = &self.logger {
            logger(&format!("[llm][debug] {message}"));
        }
    }

    fn log_error(&self, message: &str) {
        if let Some(logger) = &self.logger {
            logger(&format!("[llm][error] {message}"));
        }
    }
}

impl PilotLlmClient<OpenAiChatProvider> {
    /// Wire the OpenAI-compatible provider from configuration.
    pub fn from_config(
        config: &PilotConfig,
        metrics_callback: Option<MetricsCallback>,
    ) -> Result<Self, PilotLlmError> {
        let provider = OpenAiChatProvider::from_config(config)?;
        let mut client = PilotLlmClient::new(config.model.as_str(), provider);
        client.set_logger(config.logger.clone());
        client.set_metrics_callback(metrics_callback);
        Ok(client)
    }
}

/// Convert the crate's transcript representation into wire messages.
///
/// Image parts are only meaningful on user turns; system and assistant
/// turns collapse to their text content.
pub fn to_request_messages(
    messages: &[ConversationMessage],
) -> Result<Vec<ChatCompletionRequestMessage>, PilotLlmError> {
    messages.iter().map(to_request_message).collect()
}

fn to_request_message(
    message: &ConversationMessage,
) -> Result<ChatCompletionRequestMessage, PilotLlmError> {
    let invalid = |err: &dyn fmt::Display| PilotLlmError::InvalidMessage(err.to_string());
    match message.role {
        ChatRole::System => Ok(ChatCompletionRequestMessage::System(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(ChatCompletionRequestSystemMessageContent::Text(
                    message.text(),
                ))
                .build()
                .map_err(|e| invalid(&e))?,
        )),
        ChatRole::Assistant => Ok(ChatCompletionRequestMessage::Assistant(
            ChatCompletionRequestAssistantMessageArgs::default()
                .content(ChatCompletionRequestAssistantMessageContent::Text(
                    message.text(),
                ))
                .build()
                .map_err(|e| invalid(&e))?,
        )),
        ChatRole::User => {
            let content = match &message.content {
                MessageContent::Text(text) => {
                    ChatCompletionRequestUserMessageContent::Text(text.clone())
                }
                MessageContent::Parts(parts) => {
                    let mut converted = Vec::with_capacity(parts.len());
                    for part in parts {
                        converted.push(to_user_part(part)?);
                    }
                    ChatCompletionRequestUserMessageContent::Array(converted)
                }
            };
            Ok(ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(content)
                    .build()
                    .map_err(|e| invalid(&e))?,
            ))
        }
    }
}

fn to_user_part(
    part: &ContentPart,
) -> Result<ChatCompletionRequestUserMessageContentPart, PilotLlmError> {
    let invalid = |err: &dyn fmt::Display| PilotLlmError::InvalidMessage(err.to_string());
    match part {
        ContentPart::Text { text } => Ok(ChatCompletionRequestUserMessageContentPart::Text(
            ChatCompletionRequestMessageContentPartTextArgs::default()
                .text(text.clone())
                .build()
                .map_err(|e| invalid(&e))?,
        )),
        ContentPart::ImageUrl { image_url } => {
            Ok(ChatCompletionRequestUserMessageContentPart::ImageUrl(
                ChatCompletionRequestMessageContentPartImageArgs::default()
                    .image_url(
                        ImageUrlArgs::default()
                            .url(image_url.url.clone())
                            .build()
                            .map_err(|e| invalid(&e))?,
                    )
                    .build()
                    .map_err(|e| invalid(&e))?,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_openai::error::{ApiError, OpenAIError};
    use serde_json::json;
    use tokio::sync::Mutex;

    use async_trait::async_trait;

    #[derive(Debug, Default)]
    struct RecordingProvider {
        requests: Mutex<Vec<CreateChatCompletionRequest>>,
        response: Mutex<Option<Result<CreateChatCompletionResponse, OpenAIError>>>,
    }

    impl RecordingProvider {
        fn with_response(response: CreateChatCompletionResponse) -> Self {
            Self {
                requests: Mutex::new(Vec::new()),
                response: Mutex::new(Some(Ok(response))),
            }
        }

        fn with_error(error: OpenAIError) -> Self {
            Self {
                requests: Mutex::new(Vec::new()),
                response: Mutex::new(Some(Err(error))),
            }
        }
    }

    #[async_trait]
    impl ChatCompletionProvider for RecordingProvider {
        async fn create_chat_completion(
            &self,
            request: CreateChatCompletionRequest,
        ) -> Result<CreateChatCompletionResponse, OpenAIError> {
            self.requests.lock().await.push(request);
            self.response.lock().await.take().unwrap_or_else(|| {
                Err(OpenAIError::ApiError(ApiError {
                    message: "no response configured".into(),
                    r#type: None,
                    param: None,
                    code: None,
                }))
            })
        }
    }

    fn sample_messages() -> Vec<ConversationMessage> {
        vec![
            ConversationMessage::system("You drive a browser."),
            ConversationMessage::user("Open the docs page."),
        ]
    }

    fn sample_response() -> CreateChatCompletionResponse {
        serde_json::from_value(json!({
            "id": "cmpl-test",
            "object": "chat.completion",
            "created": 0,
            "model": "gpt-4o",
            "choices": [{
                "index": 0,
                "finish_reason": "stop",
                "message": {
                    "role": "assistant",
                    "content": "Done."
                },
                "logprobs": null
            }],
            "usage": {
                "prompt_tokens": 10,
                "completion_tokens": 5,
                "total_tokens": 15
            },
            "system_fingerprint": null
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn build_request_uses_default_model() {
        let provider = RecordingProvider::with_response(sample_response());
        let client = PilotLlmClient::new("gpt-4o", provider);

        let request = client
            .build_request(&sample_messages(), ChatCompletionOptions::default())
            .expect("build request");

        assert_eq!(request.model, "gpt-4o");
        assert_eq!(request.messages.len(), 2);
    }

    #[tokio::test]
    async fn empty_model_is_rejected() {
        let provider = RecordingProvider::default();
        let client = PilotLlmClient::new("", provider);
        let err = client
            .build_request(&sample_messages(), ChatCompletionOptions::default())
            .expect_err("missing model");
        assert!(matches!(err, PilotLlmError::MissingDefaultModel));
    }

    #[tokio::test]
    async fn metrics_callback_receives_duration() {
        let provider = RecordingProvider::with_response(sample_response());
        let metrics_invocations: Arc<std::sync::Mutex<Vec<(Option<String>, Duration)>>> =
            Arc::new(std::sync::Mutex::new(Vec::new()));
        let metrics_clone = Arc::clone(&metrics_invocations);

        let client = PilotLlmClient::new("gpt-4o", provider).with_metrics_callback(Some(
            Arc::new(move |_, duration, function| {
                metrics_clone
                    .lock()
                    .unwrap()
                    .push((function.map(|f| f.to_string()), duration));
            }),
        ));

        client
            .create_chat_completion(
                &sample_messages(),
                ChatCompletionOptions::default(),
                Some("structural"),
            )
            .await
            .expect("completion succeeds");

        let calls = metrics_invocations.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0.as_deref(), Some("structural"));
    }

    #[tokio::test]
    async fn propagates_provider_error() {
        let expected_message = "bad request".to_string();
        let provider = RecordingProvider::with_error(OpenAIError::ApiError(ApiError {
            message: expected_message.clone(),
            r#type: None,
            param: None,
            code: None,
        }));
        let client = PilotLlmClient::new("gpt-4o", provider);

        let err = client
            .create_chat_completion(&sample_messages(), ChatCompletionOptions::default(), None)
            .await
            .expect_err("should propagate error");

        match err {
            PilotLlmError::OpenAi(OpenAIError::ApiError(api_err)) => {
                assert_eq!(api_err.message, expected_message);
            }
            other => panic!("unexpected error variant: {other:?}"),
        }
    }

    #[test]
    fn image_messages_become_part_arrays() {
        let message =
            ConversationMessage::user_with_image("what is on screen?", "data:image/png;base64,AA==");
        let converted = to_request_messages(&[message]).expect("convert");
        match &converted[0] {
            ChatCompletionRequestMessage::User(user) => match &user.content {
                ChatCompletionRequestUserMessageContent::Array(parts) => {
                    assert_eq!(parts.len(), 2);
                    assert!(matches!(
                        parts[1],
                        ChatCompletionRequestUserMessageContentPart::ImageUrl(_)
                    ));
                }
                other => panic!("expected part array, got {other:?}"),
            },
            other => panic!("expected user message, got {other:?}"),
        }
    }
}
