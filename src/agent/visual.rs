//! The visual control loop: screenshot capture, normalized coordinates,
//! and a minimal direct action set for vision-capable providers.

use std::sync::Arc;
use std::time::Duration;

use async_openai::types::{ChatCompletionTool, ChatCompletionToolType, FunctionObject};
use serde_json::json;

use crate::bridge::{BridgeError, PageBridge};
use crate::capability::AgentMode;
use crate::config::PilotConfig;
use crate::dom_scripts::{webpilot_dom_script, INJECTION_PROBE};
use crate::llm::{
    ActionParser, ChatCompletionOptions, ChatCompletionProvider, ModelReply, PilotLlmClient,
    PilotLlmError, StructuredParser,
};
use crate::logging::PilotLogger;
use crate::prompts;
use crate::safety::{classify, format_confirm_message, ConfirmLevel};
use crate::types::{
    ActionKind, ActionResult, BrowserAction, ConversationMessage, PageSummary, ScreenshotData,
};

use super::confirm::ConfirmGate;
use super::events::{AgentEvent, AgentRunResult, EventSink, RunStatus, StopToken};

const STOP_MARKER: &str = "Run stopped by user.";

/// Map a 0-1000 normalized coordinate onto a pixel dimension.
pub fn scale_coordinate(raw: i64, dimension: u32) -> i64 {
    (raw as f64 / 1000.0 * f64::from(dimension)).round() as i64
}

pub struct VisualAgent<P: ChatCompletionProvider> {
    client: PilotLlmClient<P>,
    bridge: Arc<dyn PageBridge>,
    system_prompt: String,
    max_turns: u32,
    settle: Duration,
    nav_settle: Duration,
    page_load_timeout_ms: u64,
    confirm: ConfirmGate,
    events: EventSink,
    stop: StopToken,
    logger: PilotLogger,
}

impl<P: ChatCompletionProvider> VisualAgent<P> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: PilotLlmClient<P>,
        bridge: Arc<dyn PageBridge>,
        config: &PilotConfig,
        confirm: ConfirmGate,
        events: EventSink,
        stop: StopToken,
        logger: PilotLogger,
    ) -> Self {
        let system_prompt = config
            .system_prompt
            .clone()
            .unwrap_or_else(|| prompts::build_system_prompt(AgentMode::Visual));
        Self {
            client,
            bridge,
            system_prompt,
            max_turns: config.clamped_visual_max_turns(),
            settle: Duration::from_millis(config.visual_settle_ms),
            nav_settle: Duration::from_millis(config.visual_nav_settle_ms),
            page_load_timeout_ms: config.page_load_timeout_ms,
            confirm,
            events,
            stop,
            logger,
        }
    }

    pub async fn run(&self, task: &str) -> Result<AgentRunResult, PilotLlmError> {
        if let Err(e) = self.bridge.wait_for_load(self.page_load_timeout_ms).await {
            self.logger
                .error(format!("initial load wait failed: {e}"), Some("visual"), None);
        }

        let mut shot = self.capture().await;
        let mut messages = vec![ConversationMessage::system(self.system_prompt.clone())];
        messages.push(self.observation(format!("Task: {task}"), shot.as_ref()));

        let parser = StructuredParser;
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

            let options = ChatCompletionOptions {
                tools: Some(vec![browser_tool()]),
                ..ChatCompletionOptions::default()
            };
            let response = self
                .client
                .create_chat_completion(&messages, options, Some("visual"))
                .await?;
            let reply = ModelReply::from_response(&response);
            if !reply.text.is_empty() {
                self.events.emit(AgentEvent::Text {
                    text: reply.text.clone(),
                });
            }

            let actions = parser.parse(&reply);
            if actions.is_empty() {
                final_text = if reply.text.is_empty() {
                    "(no response)".to_string()
                } else {
                    reply.text.clone()
                };
                messages.push(ConversationMessage::assistant(final_text.clone()));
                status = RunStatus::Completed;
                break;
            }

            let (width, height) = shot
                .as_ref()
                .map(|s| (s.width, s.height))
                .unwrap_or((1280, 720));
            let mut outcomes = Vec::with_capacity(actions.len());
            let mut navigated = false;
            for action in &actions {
                // No page summary exists in this loop; gate against the
                // placeholder so the action-only rules still apply.
                match classify(action, &PageSummary::unknown()) {
                    ConfirmLevel::Confirm => {
                        let prompt = format_confirm_message(action, &PageSummary::unknown());
                        if !self.confirm.request(action, prompt).await {
                            self.events.emit(AgentEvent::Skipped {
                                action: action.clone(),
                                reason: "not approved".to_string(),
                            });
                            outcomes.push(format!("{}: skipped (not approved)", action.kind));
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
                    ConfirmLevel::Auto | ConfirmLevel::Notify => {}
                }

                self.events.emit(AgentEvent::Action {
                    action: action.clone(),
                });
                let result = self.execute(action, width, height).await;
                self.events.emit(AgentEvent::ActionResult {
                    action: action.clone(),
                    result: result.clone(),
                });
                outcomes.push(format!("{}: {}", action.kind, result.message));
                if action.kind == ActionKind::Navigate {
                    navigated = true;
                }
            }

            // Navigation needs far longer to settle than an in-place
            // interaction before the next capture is representative.
            if navigated {
                tokio::time::sleep(self.nav_settle).await;
                if let Err(e) = self.bridge.wait_for_load(self.page_load_timeout_ms).await {
                    self.logger
                        .error(format!("load wait failed: {e}"), Some("visual"), None);
                }
            } else {
                tokio::time::sleep(self.settle).await;
            }

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

            shot = self.capture().await;
            let outcome_list = outcomes
                .iter()
                .map(|line| format!("- {line}"))
                .collect::<Vec<_>>()
                .join("\n");
            messages.push(self.observation(
                format!("Action outcomes:\n{outcome_list}\n\nTask: {task}"),
                shot.as_ref(),
            ));
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

    async fn capture(&self) -> Option<ScreenshotData> {
        match self.bridge.screenshot().await {
            Ok(shot) => Some(shot),
            Err(e) => {
                self.logger
                    .error(format!("screenshot failed: {e}"), Some("visual"), None);
                None
            }
        }
    }

    /// User turn carrying `text` plus the current screenshot, degrading to
    /// text-only when capture failed.
    fn observation(&self, text: String, shot: Option<&ScreenshotData>) -> ConversationMessage {
        match shot {
            Some(shot) => ConversationMessage::user_with_image(
                text,
                format!("data:image/png;base64,{}", shot.data),
            ),
            None => ConversationMessage::user(format!("{text}\n\n(screenshot unavailable)")),
        }
    }

    async fn ensure_injected(&self) -> Result<(), BridgeError> {
        let present = self
            .bridge
            .evaluate(INJECTION_PROBE)
            .await
            .ok()
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if !present {
            self.bridge.evaluate(webpilot_dom_script()).await?;
        }
        Ok(())
    }

    /// Minimal direct action set; coordinates arrive 0-1000 normalized and
    /// are scaled against the capture dimensions.
    async fn execute(&self, action: &BrowserAction, width: u32, height: u32) -> ActionResult {
        match self.try_execute(action, width, height).await {
            Ok(result) => result,
            Err(e) => ActionResult::fail(format!("{} failed: {e}", action.kind)),
        }
    }

    async fn try_execute(
        &self,
        action: &BrowserAction,
        width: u32,
        height: u32,
    ) -> Result<ActionResult, BridgeError> {
        match action.kind {
            ActionKind::Click => {
                let (raw_x, raw_y) = match (action.param_i64("x"), action.param_i64("y")) {
                    (Some(x), Some(y)) => (x, y),
                    _ => {
                        return Err(BridgeError::Unsupported(
                            "click requires x and y coordinates",
                        ))
                    }
                };
                let x = scale_coordinate(raw_x, width);
                let y = scale_coordinate(raw_y, height);
                self.ensure_injected().await?;
                self.bridge
                    .evaluate(&format!("window.__webpilot.clickPoint({x}, {y})"))
                    .await?;
                Ok(ActionResult::ok(format!("clicked at ({x}, {y})")))
            }
            ActionKind::Type => {
                let text = action
                    .param_str("text")
                    .ok_or(BridgeError::Unsupported("type requires a text parameter"))?;
                let clear = action.param_bool("clear").unwrap_or(false);
                let literal = serde_json::Value::String(text.to_string()).to_string();
                self.ensure_injected().await?;
                self.bridge
                    .evaluate(&format!("window.__webpilot.typeText(null, {literal}, {clear})"))
                    .await?;
                Ok(ActionResult::ok(format!(
                    "typed {} characters into the focused element",
                    text.chars().count()
                )))
            }
            ActionKind::Scroll => {
                let dx = action.param_i64("dx").unwrap_or(0);
                let dy = action.param_i64("dy").unwrap_or(0);
                self.ensure_injected().await?;
                self.bridge
                    .evaluate(&format!("window.__webpilot.scrollBy({dx}, {dy})"))
                    .await?;
                Ok(ActionResult::ok(format!("scrolled by ({dx}, {dy})")))
            }
            ActionKind::Navigate => {
                let target = action
                    .param_str("url")
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .ok_or(BridgeError::Unsupported("navigate requires a non-empty url"))?;
                let url = if target.contains("://") {
                    target.to_string()
                } else {
                    format!("https://{target}")
                };
                self.bridge.navigate(&url).await?;
                Ok(ActionResult::ok(format!("navigated to {url}")))
            }
            ActionKind::PressKey => {
                let key = action
                    .param_str("key")
                    .ok_or(BridgeError::Unsupported("pressKey requires a key parameter"))?;
                let literal = serde_json::Value::String(key.to_string()).to_string();
                self.ensure_injected().await?;
                self.bridge
                    .evaluate(&format!("window.__webpilot.pressKey({literal})"))
                    .await?;
                Ok(ActionResult::ok(format!("pressed {key}")))
            }
            ActionKind::Wait => {
                let ms = action.param_u64("ms").unwrap_or(1_000).min(30_000);
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(ActionResult::ok(format!("waited {ms} ms")))
            }
            other => Err(BridgeError::Message(format!(
                "{other} is not available in visual mode"
            ))),
        }
    }
}

/// Single generic tool whose arguments carry the action kind, matching the
/// wrapper form [`StructuredParser`] accepts.
fn browser_tool() -> ChatCompletionTool {
    let function = FunctionObject {
        name: "browser".to_string(),
        description: Some(
            "Perform one browser action. Coordinates are normalized to a \
             0-1000 grid over the viewport."
                .to_string(),
        ),
        parameters: Some(json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["click", "type", "scroll", "navigate", "pressKey", "wait"]
                },
                "x": { "type": "integer", "minimum": 0, "maximum": 1000 },
                "y": { "type": "integer", "minimum": 0, "maximum": 1000 },
                "text": { "type": "string" },
                "clear": { "type": "boolean" },
                "url": { "type": "string" },
                "key": { "type": "string" },
                "dx": { "type": "integer" },
                "dy": { "type": "integer" },
                "ms": { "type": "integer" }
            },
            "required": ["action"],
            "additionalProperties": false
        })),
        strict: None,
    };
    ChatCompletionTool {
        r#type: ChatCompletionToolType::Function,
        function,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinates_scale_against_viewport() {
        assert_eq!(scale_coordinate(500, 1400), 700);
        assert_eq!(scale_coordinate(500, 900), 450);
        assert_eq!(scale_coordinate(0, 1400), 0);
        assert_eq!(scale_coordinate(1000, 1400), 1400);
    }

    #[test]
    fn scaling_rounds_to_nearest_pixel() {
        // 333/1000 * 900 = 299.7
        assert_eq!(scale_coordinate(333, 900), 300);
        // 1/1000 * 900 = 0.9
        assert_eq!(scale_coordinate(1, 900), 1);
    }

    #[test]
    fn browser_tool_requires_action_field() {
        let tool = browser_tool();
        assert_eq!(tool.function.name, "browser");
        let params = tool.function.parameters.expect("schema");
        assert_eq!(params["required"][0], "action");
    }
}
