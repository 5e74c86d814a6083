//! Routes the closed action vocabulary onto [`PageBridge`] primitives.
//!
//! `dispatch` never returns an error. Whatever goes wrong, including an
//! unreachable execution context, comes back as an [`ActionResult`] with
//! `success: false` and a diagnostic message, so the control loops can hand
//! the outcome straight back to the model.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use crate::bridge::{BridgeError, PageBridge};
use crate::dom_scripts::{webpilot_dom_script, INJECTION_PROBE};
use crate::logging::PilotLogger;
use crate::types::{
    ActionKind, ActionResult, BrowserAction, ElementDetails, ElementInfo, PageSummary,
    ScreenshotData,
};

/// Upper bound for an explicit `wait` action.
const MAX_WAIT_MS: u64 = 30_000;
/// Default pause when `wait` is issued without a duration.
const DEFAULT_WAIT_MS: u64 = 1_000;
/// Default scroll distance when no delta is given.
const DEFAULT_SCROLL_PX: i64 = 600;

pub struct ActionDispatcher {
    bridge: Arc<dyn PageBridge>,
    logger: PilotLogger,
}

/// JSON string literal for embedding in a generated JS expression.
fn js_str(value: &str) -> String {
    Value::String(value.to_string()).to_string()
}

impl ActionDispatcher {
    pub fn new(bridge: Arc<dyn PageBridge>, logger: PilotLogger) -> Self {
        Self { bridge, logger }
    }

    pub fn bridge(&self) -> &Arc<dyn PageBridge> {
        &self.bridge
    }

    /// Install the page-side helpers if the current document lacks them.
    /// Navigation resets the page context, so every helper call re-checks.
    async fn ensure_injected(&self) -> Result<(), BridgeError> {
        let present = self
            .bridge
            .evaluate(INJECTION_PROBE)
            .await
            .ok()
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if present {
            return Ok(());
        }
        self.bridge.evaluate(webpilot_dom_script()).await?;
        Ok(())
    }

    async fn helper(&self, expression: &str) -> Result<Value, BridgeError> {
        self.ensure_injected().await?;
        self.bridge
            .evaluate(&format!("window.__webpilot.{expression}"))
            .await
    }

    /// Fetch a fresh snapshot of page state for the next model turn.
    pub async fn page_summary(&self) -> Result<PageSummary, BridgeError> {
        let value = self.helper("pageSummary()").await?;
        serde_json::from_value(value).map_err(|e| BridgeError::Message(format!("bad summary: {e}")))
    }

    pub async fn screenshot(&self) -> Result<ScreenshotData, BridgeError> {
        self.bridge.screenshot().await
    }

    /// Execute one action. Failures become unsuccessful results, never
    /// errors.
    pub async fn dispatch(&self, action: &BrowserAction) -> ActionResult {
        self.logger.debug(
            format!("dispatch {}", action.kind),
            Some("dispatch"),
            serde_json::to_value(action).ok(),
        );
        let result = match self.try_dispatch(action).await {
            Ok(result) => result,
            Err(e) => ActionResult::fail(format!("{} failed: {e}", action.kind)),
        };
        if !result.success {
            self.logger
                .error(result.message.clone(), Some("dispatch"), None);
        }
        result
    }

    async fn try_dispatch(&self, action: &BrowserAction) -> Result<ActionResult, BridgeError> {
        match action.kind {
            ActionKind::Click => self.click(action).await,
            ActionKind::Type => self.type_text(action).await,
            ActionKind::Scroll => self.scroll(action).await,
            ActionKind::Navigate => self.navigate(action).await,
            ActionKind::Screenshot => {
                let shot = self.bridge.screenshot().await?;
                let size = format!("captured {}x{} screenshot", shot.width, shot.height);
                Ok(ActionResult::ok_with(size, serde_json::to_value(shot).unwrap_or(Value::Null)))
            }
            ActionKind::Wait => {
                let ms = action
                    .param_u64("ms")
                    .or_else(|| action.param_u64("seconds").map(|s| s * 1_000))
                    .unwrap_or(DEFAULT_WAIT_MS)
                    .min(MAX_WAIT_MS);
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(ActionResult::ok(format!("waited {ms} ms")))
            }
            ActionKind::Hover => {
                let index = require_index(action, "index")?;
                let label = self.helper(&format!("hoverIndex({index})")).await?;
                Ok(ActionResult::ok(format!("hovered {}", text_of(&label))))
            }
            ActionKind::Select => {
                let index = require_index(action, "index")?;
                let value = require_str(action, "value")?;
                let text = self
                    .helper(&format!("selectOption({index}, {})", js_str(value)))
                    .await?;
                Ok(ActionResult::ok(format!("selected {}", text_of(&text))))
            }
            ActionKind::PressKey => {
                let key = require_str(action, "key")?;
                self.helper(&format!("pressKey({})", js_str(key))).await?;
                Ok(ActionResult::ok(format!("pressed {key}")))
            }
            ActionKind::GoBack => {
                self.bridge.go_back().await?;
                Ok(ActionResult::ok("navigated back"))
            }
            ActionKind::GoForward => {
                self.bridge.go_forward().await?;
                Ok(ActionResult::ok("navigated forward"))
            }
            ActionKind::Refresh => {
                self.bridge.reload().await?;
                Ok(ActionResult::ok("page reloaded"))
            }
            ActionKind::DragDrop => {
                let source = require_index(action, "sourceIndex")?;
                let target = require_index(action, "targetIndex")?;
                let label = self
                    .helper(&format!("dragDrop({source}, {target})"))
                    .await?;
                Ok(ActionResult::ok(format!("dropped onto {}", text_of(&label))))
            }
            ActionKind::UploadFile => {
                let selector = action.param_str("selector").unwrap_or("input[type=file]");
                let path = require_str(action, "path")?;
                self.bridge.upload_file(selector, path).await?;
                Ok(ActionResult::ok(format!("attached {path}")))
            }
            ActionKind::SwitchTab => {
                let index = require_index(action, "index")?;
                self.bridge.switch_tab(index as usize).await?;
                Ok(ActionResult::ok(format!("switched to tab {index}")))
            }
            ActionKind::ExecuteJs => {
                let code = action
                    .param_str("code")
                    .or_else(|| action.param_str("script"))
                    .ok_or(BridgeError::Unsupported("executeJS requires a code parameter"))?;
                let value = self.bridge.evaluate(code).await?;
                Ok(ActionResult::ok_with("script executed", value))
            }
            ActionKind::GetElements => {
                let raw = self.helper("getElements()").await?;
                let elements: Vec<ElementInfo> = serde_json::from_value(raw)
                    .map_err(|e| BridgeError::Message(format!("bad element listing: {e}")))?;
                let count = elements.len();
                Ok(ActionResult::ok_with(
                    format!("enumerated {count} interactive elements"),
                    serde_json::to_value(&elements).unwrap_or(Value::Null),
                ))
            }
            ActionKind::GetElementDetails => {
                let index = require_index(action, "index")?;
                let raw = self.helper(&format!("getElementDetails({index})")).await?;
                let details: ElementDetails = serde_json::from_value(raw)
                    .map_err(|e| BridgeError::Message(format!("bad element details: {e}")))?;
                Ok(ActionResult::ok_with(
                    format!("details for element {index}"),
                    serde_json::to_value(&details).unwrap_or(Value::Null),
                ))
            }
        }
    }

    /// Address precedence: element index, then selector, then coordinates.
    async fn click(&self, action: &BrowserAction) -> Result<ActionResult, BridgeError> {
        if let Some(index) = action.param_u64("index") {
            let label = self.helper(&format!("clickIndex({index})")).await?;
            return Ok(ActionResult::ok(format!("clicked {}", text_of(&label))));
        }
        if let Some(selector) = action.param_str("selector") {
            let label = self
                .helper(&format!("clickSelector({})", js_str(selector)))
                .await?;
            return Ok(ActionResult::ok(format!("clicked {}", text_of(&label))));
        }
        if let (Some(x), Some(y)) = (action.param_i64("x"), action.param_i64("y")) {
            let label = self.helper(&format!("clickPoint({x}, {y})")).await?;
            return Ok(ActionResult::ok(format!(
                "clicked {} at ({x}, {y})",
                text_of(&label)
            )));
        }
        Err(BridgeError::Unsupported(
            "click requires an index, selector, or x/y coordinates",
        ))
    }

    async fn type_text(&self, action: &BrowserAction) -> Result<ActionResult, BridgeError> {
        let text = require_str(action, "text")?;
        let clear = action.param_bool("clear").unwrap_or(false);
        let target = if let Some(index) = action.param_u64("index") {
            index.to_string()
        } else if let Some(selector) = action.param_str("selector") {
            js_str(selector)
        } else {
            // Fall through to the focused element.
            "null".to_string()
        };
        let label = self
            .helper(&format!("typeText({target}, {}, {clear})", js_str(text)))
            .await?;
        Ok(ActionResult::ok(format!(
            "typed {} characters into {}",
            text.chars().count(),
            text_of(&label)
        )))
    }

    async fn scroll(&self, action: &BrowserAction) -> Result<ActionResult, BridgeError> {
        if let Some(index) = action.param_u64("index") {
            let label = self.helper(&format!("scrollToIndex({index})")).await?;
            return Ok(ActionResult::ok(format!(
                "scrolled to {}",
                text_of(&label)
            )));
        }
        let dx = action.param_i64("dx").unwrap_or(0);
        let dy = action.param_i64("dy").unwrap_or_else(|| {
            match action.param_str("direction") {
                Some("up") => -DEFAULT_SCROLL_PX,
                _ => DEFAULT_SCROLL_PX,
            }
        });
        let position = self.helper(&format!("scrollBy({dx}, {dy})")).await?;
        Ok(ActionResult::ok_with(
            format!("scrolled by ({dx}, {dy})"),
            position,
        ))
    }

    async fn navigate(&self, action: &BrowserAction) -> Result<ActionResult, BridgeError> {
        let target = action
            .param_str("url")
            .or_else(|| action.param_str("target"))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(BridgeError::Unsupported("navigate requires a non-empty url"))?;
        let url = if target.contains("://") {
            target.to_string()
        } else {
            format!("https://{target}")
        };
        self.bridge.navigate(&url).await?;
        Ok(ActionResult::ok_with(
            format!("navigated to {url}"),
            json!({ "url": url }),
        ))
    }
}

fn require_str<'a>(action: &'a BrowserAction, key: &'static str) -> Result<&'a str, BridgeError> {
    action
        .param_str(key)
        .ok_or(BridgeError::Message(format!(
            "{} requires a {key} parameter",
            action.kind
        )))
}

fn require_index(action: &BrowserAction, key: &'static str) -> Result<u64, BridgeError> {
    action.param_u64(key).ok_or(BridgeError::Message(format!(
        "{} requires a numeric {key} parameter",
        action.kind
    )))
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) if !s.is_empty() => format!("\"{s}\""),
        _ => "element".to_string(),
    }
}
