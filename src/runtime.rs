//! Chromiumoxide-backed page bridge.
//!
//! Implements [`PageBridge`] over a real Chrome instance through CDP. The
//! bridge either launches a local browser or attaches to an already-running
//! one via a CDP URL, then drives a single active page; `switch_tab`
//! repoints the active page at another target.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chromiumoxide::cdp::browser_protocol::dom::SetFileInputFilesParams;
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, GetNavigationHistoryParams, NavigateToHistoryEntryParams,
};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{
    browser::{Browser, BrowserConfig},
    page::Page as ChromiumPage,
};
use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::bridge::{BridgeError, PageBridge};
use crate::config::PilotConfig;
use crate::types::{ScreenshotData, Viewport};

const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct ChromiumBridge {
    state: Arc<Mutex<Option<BridgeState>>>,
}

struct BridgeState {
    browser: Arc<Browser>,
    _handler: JoinHandle<()>,
    active: ChromiumPage,
}

impl ChromiumBridge {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(None)),
        }
    }

    /// Launch a local Chrome or attach to `cdp_url` when one is configured,
    /// and make the first page active. A no-op if already connected.
    pub async fn connect(&self, config: &PilotConfig) -> Result<(), BridgeError> {
        if self.state.lock().await.is_some() {
            return Ok(());
        }

        let (browser, handler) = match config.cdp_url.as_deref() {
            Some(url) => Browser::connect(url).await.map_err(map_cdp_error)?,
            None => {
                let browser_config = build_config(config)?;
                Browser::launch(browser_config)
                    .await
                    .map_err(map_cdp_error)?
            }
        };
        let browser = Arc::new(browser);
        let handler = spawn_handler(handler);

        let pages = browser.pages().await.map_err(map_cdp_error)?;
        let active = match pages.into_iter().next() {
            Some(page) => page,
            None => browser
                .new_page("about:blank")
                .await
                .map_err(map_cdp_error)?,
        };

        let mut guard = self.state.lock().await;
        *guard = Some(BridgeState {
            browser,
            _handler: handler,
            active,
        });
        Ok(())
    }

    pub async fn shutdown(&self) -> Result<(), BridgeError> {
        let state = self.state.lock().await.take();
        if let Some(state) = state {
            state._handler.abort();
            if let Ok(mut browser) = Arc::try_unwrap(state.browser) {
                let _ = browser.close().await;
            }
        }
        Ok(())
    }

    async fn active_page(&self) -> Result<ChromiumPage, BridgeError> {
        let guard = self.state.lock().await;
        let state = guard.as_ref().ok_or(BridgeError::NotInitialized)?;
        Ok(state.active.clone())
    }

    async fn viewport(&self, page: &ChromiumPage) -> Result<Viewport, BridgeError> {
        let result = page
            .evaluate_expression("({ width: window.innerWidth, height: window.innerHeight })")
            .await
            .map_err(map_cdp_error)?;
        let value = result.value().cloned().unwrap_or(Value::Null);
        serde_json::from_value(value)
            .map_err(|e| BridgeError::Message(format!("bad viewport value: {e}")))
    }

    async fn navigate_history(&self, offset: i64) -> Result<(), BridgeError> {
        let page = self.active_page().await?;
        let history = page
            .execute(GetNavigationHistoryParams::default())
            .await
            .map_err(map_cdp_error)?;
        let target = history.current_index + offset;
        let Some(entry) = usize::try_from(target)
            .ok()
            .and_then(|i| history.entries.get(i))
        else {
            // Nowhere to go in that direction; treat as a no-op.
            return Ok(());
        };
        page.execute(NavigateToHistoryEntryParams::new(entry.id))
            .await
            .map_err(map_cdp_error)?;
        Ok(())
    }
}

impl Default for ChromiumBridge {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageBridge for ChromiumBridge {
    async fn evaluate(&self, expression: &str) -> Result<Value, BridgeError> {
        let page = self.active_page().await?;
        let result = page
            .evaluate_expression(expression)
            .await
            .map_err(map_cdp_error)?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn navigate(&self, url: &str) -> Result<(), BridgeError> {
        let page = self.active_page().await?;
        page.goto(url).await.map_err(map_cdp_error)?;
        Ok(())
    }

    async fn go_back(&self) -> Result<(), BridgeError> {
        self.navigate_history(-1).await
    }

    async fn go_forward(&self) -> Result<(), BridgeError> {
        self.navigate_history(1).await
    }

    async fn reload(&self) -> Result<(), BridgeError> {
        let page = self.active_page().await?;
        page.reload().await.map_err(map_cdp_error)?;
        Ok(())
    }

    async fn screenshot(&self) -> Result<ScreenshotData, BridgeError> {
        let page = self.active_page().await?;
        let viewport = self.viewport(&page).await?;
        let bytes = page
            .screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .build(),
            )
            .await
            .map_err(map_cdp_error)?;
        Ok(ScreenshotData {
            data: BASE64.encode(bytes),
            width: viewport.width,
            height: viewport.height,
        })
    }

    async fn upload_file(&self, selector: &str, path: &str) -> Result<(), BridgeError> {
        let page = self.active_page().await?;
        let element = page.find_element(selector).await.map_err(map_cdp_error)?;
        let params = SetFileInputFilesParams::builder()
            .files(vec![path.to_string()])
            .node_id(element.node_id)
            .build()
            .map_err(BridgeError::Message)?;
        page.execute(params).await.map_err(map_cdp_error)?;
        Ok(())
    }

    async fn switch_tab(&self, index: usize) -> Result<(), BridgeError> {
        let mut guard = self.state.lock().await;
        let state = guard.as_mut().ok_or(BridgeError::NotInitialized)?;
        let pages = state.browser.pages().await.map_err(map_cdp_error)?;
        let page = pages
            .into_iter()
            .nth(index)
            .ok_or_else(|| BridgeError::Message(format!("no tab at index {index}")))?;
        page.bring_to_front().await.map_err(map_cdp_error)?;
        state.active = page;
        Ok(())
    }

    async fn wait_for_load(&self, timeout_ms: u64) -> Result<(), BridgeError> {
        let page = self.active_page().await?;
        let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            let ready = page
                .evaluate_expression("document.readyState")
                .await
                .ok()
                .and_then(|r| r.value().cloned())
                .and_then(|v| v.as_str().map(|s| s == "complete"))
                .unwrap_or(false);
            if ready || tokio::time::Instant::now() >= deadline {
                // A still-loading page is observable state, not an error.
                return Ok(());
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }
}

fn build_config(config: &PilotConfig) -> Result<BrowserConfig, BridgeError> {
    let mut builder = BrowserConfig::builder();
    if let Some(path) = &config.chrome_executable {
        builder = builder.chrome_executable(path);
    }
    let builder = if config.headless {
        builder
    } else {
        builder.with_head()
    };
    builder.build().map_err(BridgeError::Message)
}

fn map_cdp_error<E: std::fmt::Display>(err: E) -> BridgeError {
    BridgeError::Unreachable(err.to_string())
}

fn spawn_handler(mut handler: chromiumoxide::handler::Handler) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(result) = handler.next().await {
            if let Err(err) = result {
                log::warn!("chromiumoxide handler error: {err}");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActionKind, BrowserAction};

    #[tokio::test]
    async fn calls_before_connect_report_not_initialised() {
        let bridge = ChromiumBridge::new();
        let err = bridge.evaluate("1 + 1").await.expect_err("no browser");
        assert!(matches!(err, BridgeError::NotInitialized));

        let err = bridge.navigate("https://example.com").await.expect_err("no browser");
        assert!(err.to_string().contains("not initialised"));
    }

    #[tokio::test]
    async fn dispatcher_over_unconnected_bridge_fails_closed() {
        use crate::config::Verbosity;
        use crate::dispatch::ActionDispatcher;
        use crate::logging::PilotLogger;

        let bridge = Arc::new(ChromiumBridge::new());
        let dispatcher =
            ActionDispatcher::new(bridge as Arc<dyn PageBridge>, PilotLogger::new(Verbosity::Minimal));
        let result = dispatcher
            .dispatch(&BrowserAction::new(ActionKind::GetElements))
            .await;
        assert!(!result.success);
    }
}
