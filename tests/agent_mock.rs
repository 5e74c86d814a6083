//! Structural loop tests over a scripted model and a mock page.
//!
//! No browser and no network: the provider replays canned completions and
//! the bridge replays canned page state, so every scenario is deterministic.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_openai::error::OpenAIError;
use async_openai::types::{CreateChatCompletionRequest, CreateChatCompletionResponse};
use async_trait::async_trait;
use serde_json::{json, Value};

use webpilot::agent::{ConfirmGate, EventSink, RunStatus, StopToken, StructuralAgent};
use webpilot::bridge::{BridgeError, PageBridge};
use webpilot::config::{PilotConfig, Verbosity};
use webpilot::dispatch::ActionDispatcher;
use webpilot::llm::{ChatCompletionProvider, PilotLlmClient, StructuredParser};
use webpilot::logging::PilotLogger;
use webpilot::types::ScreenshotData;

/// Provider that replays a fixed queue of completions, then reports done.
#[derive(Default)]
struct ScriptedProvider {
    responses: Mutex<VecDeque<CreateChatCompletionResponse>>,
}

impl ScriptedProvider {
    fn with_responses(responses: Vec<CreateChatCompletionResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
        }
    }
}

#[async_trait]
impl ChatCompletionProvider for ScriptedProvider {
    async fn create_chat_completion(
        &self,
        _request: CreateChatCompletionRequest,
    ) -> Result<CreateChatCompletionResponse, OpenAIError> {
        let next = self.responses.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| text_response("All done.")))
    }
}

fn completion(message: Value) -> CreateChatCompletionResponse {
    serde_json::from_value(json!({
        "id": "cmpl-scripted",
        "object": "chat.completion",
        "created": 0,
        "model": "test-model",
        "choices": [{
            "index": 0,
            "finish_reason": "stop",
            "logprobs": null,
            "message": message
        }],
        "usage": {
            "prompt_tokens": 12,
            "completion_tokens": 4,
            "total_tokens": 16
        },
        "system_fingerprint": null
    }))
    .expect("completion json")
}

fn text_response(text: &str) -> CreateChatCompletionResponse {
    completion(json!({ "role": "assistant", "content": text }))
}

fn tool_response(name: &str, arguments: Value) -> CreateChatCompletionResponse {
    completion(json!({
        "role": "assistant",
        "content": null,
        "tool_calls": [{
            "id": "call_0",
            "type": "function",
            "function": { "name": name, "arguments": arguments.to_string() }
        }]
    }))
}

/// Bridge that serves canned page state and records every evaluation.
#[derive(Default)]
struct MockBridge {
    evaluated: Mutex<Vec<String>>,
    /// Successive payloads for element enumerations; the page "changes"
    /// between enumerations by queueing different listings.
    element_listings: Mutex<VecDeque<Value>>,
    summaries_served: Mutex<usize>,
    /// Stopped after the second summary refresh when set, simulating a
    /// user abort while a turn is in flight.
    stop_after_second_refresh: Option<StopToken>,
}

#[async_trait]
impl PageBridge for MockBridge {
    async fn evaluate(&self, expression: &str) -> Result<Value, BridgeError> {
        self.evaluated.lock().unwrap().push(expression.to_string());
        if expression.starts_with("typeof window.__webpilot") {
            return Ok(Value::Bool(true));
        }
        if expression.contains("pageSummary()") {
            let mut served = self.summaries_served.lock().unwrap();
            *served += 1;
            if *served >= 2 {
                if let Some(stop) = &self.stop_after_second_refresh {
                    stop.stop();
                }
            }
            return Ok(json!({
                "url": "https://example.com/docs",
                "title": "Docs",
                "viewport": { "width": 1280, "height": 800 },
                "scroll": { "x": 0.0, "y": 0.0 },
                "elementCounts": { "links": 4, "buttons": 1, "inputs": 0, "forms": 0, "images": 2 },
                "visibleText": "Welcome to the docs."
            }));
        }
        if expression.contains("getElements()") {
            let next = self.element_listings.lock().unwrap().pop_front();
            return Ok(next.unwrap_or_else(|| json!([])));
        }
        Ok(Value::String("element".to_string()))
    }

    async fn navigate(&self, _url: &str) -> Result<(), BridgeError> {
        Ok(())
    }

    async fn go_back(&self) -> Result<(), BridgeError> {
        Ok(())
    }

    async fn go_forward(&self) -> Result<(), BridgeError> {
        Ok(())
    }

    async fn reload(&self) -> Result<(), BridgeError> {
        Ok(())
    }

    async fn screenshot(&self) -> Result<ScreenshotData, BridgeError> {
        Ok(ScreenshotData {
            data: "aGk=".to_string(),
            width: 1280,
            height: 800,
        })
    }

    async fn upload_file(&self, _selector: &str, _path: &str) -> Result<(), BridgeError> {
        Ok(())
    }

    async fn switch_tab(&self, _index: usize) -> Result<(), BridgeError> {
        Ok(())
    }

    async fn wait_for_load(&self, _timeout_ms: u64) -> Result<(), BridgeError> {
        Ok(())
    }
}

fn listing(count: usize) -> Value {
    let elements: Vec<Value> = (0..count)
        .map(|i| {
            json!({
                "index": i,
                "tag": "a",
                "text": format!("Link {i}"),
                "visible": true,
                "enabled": true,
                "rect": { "x": 0.0, "y": (i as f64) * 20.0, "width": 100.0, "height": 16.0 }
            })
        })
        .collect();
    Value::Array(elements)
}

fn test_config(max_turns: u32) -> PilotConfig {
    let mut config = PilotConfig::default();
    config.max_turns = max_turns;
    config.action_settle_ms = 0;
    config
}

fn build_agent(
    responses: Vec<CreateChatCompletionResponse>,
    bridge: Arc<MockBridge>,
    config: &PilotConfig,
    confirm: ConfirmGate,
    stop: StopToken,
) -> StructuralAgent<ScriptedProvider> {
    let logger = PilotLogger::new(Verbosity::Minimal);
    let client = PilotLlmClient::new("test-model", ScriptedProvider::with_responses(responses));
    let dispatcher = ActionDispatcher::new(bridge as Arc<dyn PageBridge>, logger.clone());
    StructuralAgent::new(
        client,
        dispatcher,
        Box::new(StructuredParser),
        true,
        config,
        confirm,
        EventSink::disabled(),
        stop,
        logger,
    )
}

#[tokio::test]
async fn run_ends_when_model_returns_no_actions() {
    let bridge = Arc::new(MockBridge::default());
    let agent = build_agent(
        vec![text_response("The page already shows the answer.")],
        bridge,
        &test_config(10),
        ConfirmGate::deny_all(),
        StopToken::new(),
    );

    let outcome = agent.run("what does the page say?").await.expect("run");
    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.message, "The page already shows the answer.");
    assert_eq!(outcome.turns_used, 1);
}

#[tokio::test]
async fn turn_ceiling_is_enforced_with_notice() {
    let bridge = Arc::new(MockBridge::default());
    // The model would act forever; the ceiling of one turn cuts it off.
    let agent = build_agent(
        vec![
            tool_response("click", json!({ "index": 0 })),
            tool_response("click", json!({ "index": 0 })),
        ],
        bridge,
        &test_config(1),
        ConfirmGate::deny_all(),
        StopToken::new(),
    );

    let outcome = agent.run("keep clicking").await.expect("run");
    assert_eq!(outcome.status, RunStatus::ExhaustedTurns);
    assert_eq!(outcome.turns_used, 1);
    assert!(outcome.message.contains("reached maximum turns"));
}

#[tokio::test]
async fn pre_stopped_token_halts_before_any_model_call() {
    let bridge = Arc::new(MockBridge::default());
    let stop = StopToken::new();
    stop.stop();
    let agent = build_agent(
        vec![tool_response("click", json!({ "index": 0 }))],
        bridge.clone(),
        &test_config(10),
        ConfirmGate::deny_all(),
        stop,
    );

    let outcome = agent.run("anything").await.expect("run");
    assert_eq!(outcome.status, RunStatus::Stopped);
    assert_eq!(outcome.message, "Run stopped by user.");
    assert_eq!(outcome.turns_used, 0);
    // No click ever reached the page.
    let calls = bridge.evaluated.lock().unwrap();
    assert!(!calls.iter().any(|c| c.contains("clickIndex")));
}

#[tokio::test]
async fn stop_during_a_turn_takes_effect_at_the_next_boundary() {
    let stop = StopToken::new();
    let bridge = Arc::new(MockBridge {
        stop_after_second_refresh: Some(stop.clone()),
        ..MockBridge::default()
    });
    let agent = build_agent(
        vec![
            tool_response("click", json!({ "index": 0 })),
            tool_response("click", json!({ "index": 1 })),
        ],
        bridge.clone(),
        &test_config(10),
        ConfirmGate::deny_all(),
        stop,
    );

    let outcome = agent.run("click things").await.expect("run");
    assert_eq!(outcome.status, RunStatus::Stopped);
    // Turn one ran to completion, including its click.
    assert_eq!(outcome.turns_used, 1);
    let calls = bridge.evaluated.lock().unwrap();
    assert!(calls.iter().any(|c| c.contains("clickIndex(0)")));
    assert!(!calls.iter().any(|c| c.contains("clickIndex(1)")));
    let last = outcome.transcript.last().expect("transcript");
    assert_eq!(last.text(), "Run stopped by user.");
}

#[tokio::test]
async fn denied_confirmation_skips_the_action_and_continues() {
    let bridge = Arc::new(MockBridge::default());
    let agent = build_agent(
        vec![
            tool_response("executeJS", json!({ "code": "window.close()" })),
            text_response("Finished without running the script."),
        ],
        bridge.clone(),
        &test_config(10),
        // No consumer attached, so the script request is denied.
        ConfirmGate::deny_all(),
        StopToken::new(),
    );

    let outcome = agent.run("close the window").await.expect("run");
    assert_eq!(outcome.status, RunStatus::Completed);
    assert_eq!(outcome.turns_used, 2);
    let calls = bridge.evaluated.lock().unwrap();
    assert!(!calls.iter().any(|c| c == "window.close()"));
    assert!(outcome
        .transcript
        .iter()
        .any(|m| m.text().contains("skipped (not approved)")));
}

#[tokio::test]
async fn approved_confirmation_dispatches_the_action() {
    let bridge = Arc::new(MockBridge::default());
    let (confirm, mut requests) = ConfirmGate::channel(1_000);
    tokio::spawn(async move {
        while let Some(request) = requests.recv().await {
            let _ = request.respond.send(true);
        }
    });
    let agent = build_agent(
        vec![
            tool_response("executeJS", json!({ "code": "document.title" })),
            text_response("Done."),
        ],
        bridge.clone(),
        &test_config(10),
        confirm,
        StopToken::new(),
    );

    let outcome = agent.run("read the title").await.expect("run");
    assert_eq!(outcome.status, RunStatus::Completed);
    let calls = bridge.evaluated.lock().unwrap();
    assert!(calls.iter().any(|c| c == "document.title"));
}

#[tokio::test]
async fn element_enumeration_is_fresh_each_time() {
    let bridge = Arc::new(MockBridge {
        element_listings: Mutex::new(VecDeque::from([listing(2), listing(1)])),
        ..MockBridge::default()
    });
    // Two enumerations of a page whose elements changed in between.
    let agent = build_agent(
        vec![
            tool_response("getElements", json!({})),
            tool_response("getElements", json!({})),
            text_response("Enumeration complete."),
        ],
        bridge,
        &test_config(10),
        ConfirmGate::deny_all(),
        StopToken::new(),
    );

    let outcome = agent.run("list the elements twice").await.expect("run");
    assert_eq!(outcome.status, RunStatus::Completed);
    let texts: Vec<String> = outcome.transcript.iter().map(|m| m.text()).collect();
    assert!(
        texts
            .iter()
            .any(|t| t.contains("enumerated 2 interactive elements")),
        "first enumeration missing"
    );
    assert!(
        texts
            .iter()
            .any(|t| t.contains("enumerated 1 interactive elements")),
        "second enumeration missing"
    );
}
