//! webpilot is a model-driven browser-control core: a language model
//! proposes actions from a closed vocabulary, a safety classifier decides
//! how much human gating each one needs, and an action dispatcher executes
//! them against a live page through a CDP bridge.
//!
//! Two control loops cover the provider landscape. The structural loop
//! reasons over enumerated element indices and works with any chat model;
//! the visual loop feeds screenshots to vision-capable models and addresses
//! the page through normalized coordinates. [`agent::PilotAgent`] selects
//! the loop once per run from the [`capability::CapabilityMatrix`].

pub mod agent;
pub mod bridge;
pub mod capability;
pub mod config;
pub mod dispatch;
pub mod dom_scripts;
pub mod llm;
pub mod logging;
pub mod metrics;
pub mod prompts;
pub mod runtime;
pub mod safety;
pub mod types;

pub use agent::{
    AgentEvent, AgentRunResult, ConfirmGate, ConfirmRequest, PilotAgent, RunStatus, StopToken,
};
pub use bridge::{BridgeError, PageBridge};
pub use capability::{AgentMode, CapabilityMatrix, ProviderCapabilities};
pub use config::{PilotConfig, PilotConfigOverrides, Verbosity};
pub use dispatch::ActionDispatcher;
pub use runtime::ChromiumBridge;
pub use safety::{classify, format_confirm_message, ConfirmLevel};
pub use types::{ActionKind, ActionResult, BrowserAction, PageSummary, ScreenshotData};
