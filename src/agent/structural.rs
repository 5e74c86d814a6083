//! The structural control loop: model call, action extraction, safety
//! gate, dispatch, page refresh, repeat.

use std::time::Duration;

use async_openai::types::{ChatCompletionTool, ChatCompletionToolType, FunctionObject};
use serde_json::json;

use crate::capability::AgentMode;
use crate::config::PilotConfig;
use crate::dispatch::ActionDispatcher;
use crate::llm::{
    ActionParser, ChatCompletionOptions, ChatCompletionProvider, ModelReply, PilotLlmClient,
    PilotLlmError,
};
use crate::logging::PilotLogger;
use crate::prompts;
use crate::safety::{classify, format_confirm_message, ConfirmLevel};
use crate::types::{ActionKind, ConversationMessage, PageSummary};

use super::confirm::ConfirmGate;
use super::events::{AgentEvent, AgentRunResult, EventSink, RunStatus, StopToken};

const STOP_MARKER: &str = "Run stopped by user.";

pub struct StructuralAgent<P: ChatCompletionProvider> {
    client: PilotLlmClient<P>,
    dispatcher: ActionDispatcher,
    parser: Box<dyn ActionParser>,
    structured: bool,
    system_prompt: String,
    max_turns: u32,
    settle: Duration,
    confirm: ConfirmGate,
    events: EventSink,
    stop: StopToken,
    logger: PilotLogger,
}

impl<P: ChatCompletionProvider> StructuralAgent<P> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: PilotLlmClient<P>,
        dispatcher: ActionDispatcher,
        parser: Box<dyn ActionParser>,
        structured: bool,
        config: &PilotConfig,
        confirm: ConfirmGate,
        events: EventSink,
        stop: StopToken,
        logger: PilotLogger,
    ) -> Self {
        let system_prompt = config.system_prompt.clone().unwrap_or_else(|| {
            if structured {
                prompts::build_system_prompt(AgentMode::Structural)
            } else {
                prompts::build_fallback_prompt(AgentMode::Structural)
            }
        });
        Self {
            client,
            dispatcher,
            parser,
            structured,
            system_prompt,
            max_turns: config.clamped_max_turns(),
            settle: Duration::from_millis(config.action_settle_ms),
            confirm,
            events,
            stop,
            logger,
        }
    }

    /// Drive `task` to completion. Only model and transport errors
    /// propagate; everything page-side degrades into the transcript.
    pub async fn run(&self, task: &str) -> Result<AgentRunResult, PilotLlmError> {
        let mut summary = self.fresh_summary().await;
        let mut messages = vec![
            ConversationMessage::system(self.system_prompt.clone()),
            ConversationMessage::user(prompts::build_user_message(task, &summary)),
        ];
        let mut status = RunStatus::ExhaustedTurns;
        let mut final_text = String::new();
        let mut turns_used = 0;

        for turn in 1..=self.max_turns {
            if self.stop.is_stopped() {
                messages.push(ConversationMessage::assistant(STOP_MARKER));
                status = RunStatus::Stopped;
                final_text = STOP_MARKER.to_string();
                break;
            }
            turns_used = turn;
            self.events.emit(AgentEvent::Turn {
                turn,
                max_turns: self.max_turns,
            });
            self.logger.info(
                format!("turn {turn}/{}", self.max_turns),
                Some("agent"),
                None,
            );

            let options = ChatCompletionOptions {
                tools: self.structured.then(action_tools),
                ..ChatCompletionOptions::default()
            };
            let response = self
                .client
                .create_chat_completion(&messages, options, Some("structural"))
                .await?;
            let reply = ModelReply::from_response(&response);
            if !reply.text.is_empty() {
                self.events.emit(AgentEvent::Text {
                    text: reply.text.clone(),
                });
            }

            let actions = self.parser.parse(&reply);
            if actions.is_empty() {
                // Either the model is done or its output was unparseable;
                // both end the run with whatever text it produced.
                if !reply.tool_calls.is_empty() || reply.text.contains("```") {
                    self.logger.debug(
                        "reply contained no usable actions",
                        Some("agent"),
                        None,
                    );
                }
                final_text = if reply.text.is_empty() {
                    "(no response)".to_string()
                } else {
                    reply.text.clone()
                };
                messages.push(ConversationMessage::assistant(final_text.clone()));
                status = RunStatus::Completed;
                break;
            }

            let mut outcomes = Vec::with_capacity(actions.len());
            for action in &actions {
                match classify(action, &summary) {
                    ConfirmLevel::Confirm => {
                        let prompt = format_confirm_message(action, &summary);
                        if !self.confirm.request(action, prompt).await {
                            let note = format!("{}: skipped (not approved)", action.kind);
                            self.events.emit(AgentEvent::Skipped {
                                action: action.clone(),
                                reason: "not approved".to_string(),
                            });
                            outcomes.push(note);
                            continue;
                        }
                    }
                    ConfirmLevel::Block => {
                        self.events.emit(AgentEvent::Skipped {
                            action: action.clone(),
                            reason: "blocked by policy".to_string(),
                        });
                        outcomes.push(format!("{}: skipped (blocked)", action.kind));
                        continue;
                    }
                    ConfirmLevel::Notify => {
                        self.logger.info(
                            format!("auto-dispatching flagged action {}", action.kind),
                            Some("agent"),
                            None,
                        );
                    }
                    ConfirmLevel::Auto => {}
                }

                self.events.emit(AgentEvent::Action {
                    action: action.clone(),
                });
                let result = self.dispatcher.dispatch(action).await;
                self.events.emit(AgentEvent::ActionResult {
                    action: action.clone(),
                    result: result.clone(),
                });
                outcomes.push(format!("{}: {}", action.kind, result.message));
                tokio::time::sleep(self.settle).await;
            }

            summary = self.fresh_summary().await;

            let mut assistant_text = if reply.text.is_empty() {
                format!("Executed {} actions.", actions.len())
            } else {
                reply.text.clone()
            };
            if turn == self.max_turns {
                assistant_text.push_str(" [reached maximum turns; stopping here]");
                final_text = assistant_text.clone();
            }
            messages.push(ConversationMessage::assistant(assistant_text));

            let outcome_list = outcomes
                .iter()
                .map(|line| format!("- {line}"))
                .collect::<Vec<_>>()
                .join("\n");
            messages.push(ConversationMessage::user(format!(
                "Action outcomes:\n{outcome_list}\n\n{}",
                prompts::build_user_message(task, &summary)
            )));
        }

        self.events.emit(AgentEvent::Complete {
            status,
            message: final_text.clone(),
        });
        Ok(AgentRunResult {
            status,
            message: final_text,
            turns_used,
            transcript: messages,
        })
    }

    /// Refresh the page summary, degrading to the unknown placeholder when
    /// the execution context cannot answer.
    async fn fresh_summary(&self) -> PageSummary {
        match self.dispatcher.page_summary().await {
            Ok(summary) => summary,
            Err(e) => {
                self.logger.error(
                    format!("page summary unavailable: {e}"),
                    Some("agent"),
                    None,
                );
                PageSummary::unknown()
            }
        }
    }
}

/// Tool schema for structured providers, one tool per action kind.
pub fn action_tools() -> Vec<ChatCompletionTool> {
    ActionKind::ALL
        .iter()
        .map(|kind| ChatCompletionTool {
            r#type: ChatCompletionToolType::Function,
            function: FunctionObject {
                name: kind.as_str().to_string(),
                description: Some(tool_description(*kind).to_string()),
                parameters: Some(tool_parameters(*kind)),
                strict: None,
            },
        })
        .collect()
}

fn tool_description(kind: ActionKind) -> &'static str {
    match kind {
        ActionKind::Click => "Click an element, addressed by index, selector, or coordinates",
        ActionKind::Type => "Type text into an element or the focused field",
        ActionKind::Scroll => "Scroll the page by a delta or to an element index",
        ActionKind::Navigate => "Navigate to a URL",
        ActionKind::Screenshot => "Capture a screenshot of the viewport",
        ActionKind::Wait => "Pause before the next action",
        ActionKind::Hover => "Hover over an element by index",
        ActionKind::Select => "Choose an option in a select element",
        ActionKind::PressKey => "Press a keyboard key on the focused element",
        ActionKind::GoBack => "Go back in history",
        ActionKind::GoForward => "Go forward in history",
        ActionKind::Refresh => "Reload the current page",
        ActionKind::DragDrop => "Drag one element onto another by index",
        ActionKind::UploadFile => "Attach a local file to a file input",
        ActionKind::SwitchTab => "Switch to another tab by index",
        ActionKind::ExecuteJs => "Run JavaScript in the page (requires user approval)",
        ActionKind::GetElements => "Enumerate interactive elements with fresh indices",
        ActionKind::GetElementDetails => "Fetch full details for one enumerated element",
    }
}

fn tool_parameters(kind: ActionKind) -> serde_json::Value {
    let properties = match kind {
        ActionKind::Click => json!({
            "index": { "type": "integer" },
            "selector": { "type": "string" },
            "x": { "type": "integer" },
            "y": { "type": "integer" }
        }),
        ActionKind::Type => json!({
            "index": { "type": "integer" },
            "selector": { "type": "string" },
            "text": { "type": "string" },
            "clear": { "type": "boolean" }
        }),
        ActionKind::Scroll => json!({
            "index": { "type": "integer" },
            "dx": { "type": "integer" },
            "dy": { "type": "integer" }
        }),
        ActionKind::Navigate => json!({ "url": { "type": "string" } }),
        ActionKind::Wait => json!({ "ms": { "type": "integer" } }),
        ActionKind::Hover | ActionKind::SwitchTab | ActionKind::GetElementDetails => {
            json!({ "index": { "type": "integer" } })
        }
        ActionKind::Select => json!({
            "index": { "type": "integer" },
            "value": { "type": "string" }
        }),
        ActionKind::PressKey => json!({ "key": { "type": "string" } }),
        ActionKind::DragDrop => json!({
            "sourceIndex": { "type": "integer" },
            "targetIndex": { "type": "integer" }
        }),
        ActionKind::UploadFile => json!({
            "selector": { "type": "string" },
            "path": { "type": "string" }
        }),
        ActionKind::ExecuteJs => json!({ "code": { "type": "string" } }),
        ActionKind::Screenshot
        | ActionKind::GoBack
        | ActionKind::GoForward
        | ActionKind::Refresh
        | ActionKind::GetElements => json!({}),
    };
    json!({
        "type": "object",
        "properties": properties,
        "additionalProperties": true
    })
}
