//! Execution-context bridge for the browser-control loops.
//!
//! The bridge is the single seam between the crate and the remote,
//! unsynchronized page. Every call is asynchronous and may transiently
//! fail; callers treat failures as retryable and never assume the page
//! state survived a call unchanged.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::types::ScreenshotData;

/// Errors surfaced by [`PageBridge`] operations.
///
/// The dispatcher absorbs all of these into failed [`ActionResult`]s; they
/// only propagate as errors below the dispatch boundary.
///
/// [`ActionResult`]: crate::types::ActionResult
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("execution context not initialised")]
    NotInitialized,
    #[error("execution context unreachable: {0}")]
    Unreachable(String),
    #[error("{0}")]
    Unsupported(&'static str),
    #[error("{0}")]
    Message(String),
}

/// Asynchronous primitives the dispatcher composes into actions.
///
/// Element-addressed work (clicks, typing, enumeration, page snapshots)
/// goes through `evaluate` with the injected helpers from
/// [`dom_scripts`](crate::dom_scripts); the remaining methods cover the
/// operations a page script cannot perform on itself.
#[async_trait]
pub trait PageBridge: Send + Sync {
    /// Evaluate a JavaScript expression in the page and return its JSON value.
    async fn evaluate(&self, expression: &str) -> Result<Value, BridgeError>;

    /// Navigate the page to an absolute URL.
    async fn navigate(&self, url: &str) -> Result<(), BridgeError>;

    async fn go_back(&self) -> Result<(), BridgeError>;

    async fn go_forward(&self) -> Result<(), BridgeError>;

    async fn reload(&self) -> Result<(), BridgeError>;

    /// Capture the current viewport as an encoded screenshot.
    async fn screenshot(&self) -> Result<ScreenshotData, BridgeError>;

    /// Attach a local file to the file input matched by `selector`.
    async fn upload_file(&self, selector: &str, path: &str) -> Result<(), BridgeError>;

    /// Make the tab at `index` the active page for subsequent calls.
    async fn switch_tab(&self, index: usize) -> Result<(), BridgeError>;

    /// Wait until the page reports a finished load, bounded by `timeout_ms`.
    /// Returns `Ok` on timeout as well; a still-loading page is observable
    /// state, not an error.
    async fn wait_for_load(&self, timeout_ms: u64) -> Result<(), BridgeError>;
}
