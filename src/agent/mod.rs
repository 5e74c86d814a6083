//! Agent orchestration.
//!
//! [`PilotAgent`] wires configuration, the page bridge, and the capability
//! matrix into one of the two control loops. Mode and parsing strategy are
//! selected once at construction and hold for the whole run.

pub mod confirm;
pub mod events;
pub mod structural;
pub mod visual;

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::bridge::PageBridge;
use crate::capability::{AgentMode, CapabilityMatrix};
use crate::config::PilotConfig;
use crate::dispatch::ActionDispatcher;
use crate::llm::{
    ActionParser, FencedJsonParser, MetricsCallback, PilotLlmClient, PilotLlmError,
    StructuredParser,
};
use crate::logging::{LogConfig, PilotLogger};
use crate::metrics::{FunctionName, PilotMetrics};

pub use confirm::{ConfirmGate, ConfirmRequest};
pub use events::{AgentEvent, AgentRunResult, EventSink, RunStatus, StopToken};
pub use structural::StructuralAgent;
pub use visual::{scale_coordinate, VisualAgent};

/// One configured agent. Each run owns its own conversation and page state;
/// the handle only carries the pieces that outlive a run.
pub struct PilotAgent {
    config: PilotConfig,
    bridge: Arc<dyn PageBridge>,
    mode: AgentMode,
    structured: bool,
    stop: StopToken,
    confirm: ConfirmGate,
    events: EventSink,
    metrics: Arc<Mutex<PilotMetrics>>,
    logger: PilotLogger,
}

impl PilotAgent {
    pub fn new(
        config: PilotConfig,
        bridge: Arc<dyn PageBridge>,
        matrix: &CapabilityMatrix,
    ) -> Self {
        let mode = matrix.select_mode(&config.provider);
        let structured = matrix.uses_structured_parsing(&config.provider);
        let logger = build_logger(&config);
        Self {
            config,
            bridge,
            mode,
            structured,
            stop: StopToken::new(),
            confirm: ConfirmGate::deny_all(),
            events: EventSink::disabled(),
            metrics: Arc::new(Mutex::new(PilotMetrics::default())),
            logger,
        }
    }

    pub fn mode(&self) -> AgentMode {
        self.mode
    }

    /// Attach a progress event channel and return its receiver.
    pub fn subscribe_events(&mut self) -> mpsc::UnboundedReceiver<AgentEvent> {
        let (sink, receiver) = EventSink::channel();
        self.events = sink;
        receiver
    }

    /// Attach a confirmation consumer and return its receiver. Without one
    /// every confirm-level action is denied.
    pub fn subscribe_confirmations(&mut self) -> mpsc::Receiver<ConfirmRequest> {
        let (gate, receiver) = ConfirmGate::channel(self.config.confirm_timeout_ms);
        self.confirm = gate;
        receiver
    }

    /// Token for [`StopToken::stop`]; the loops observe it at turn
    /// boundaries.
    pub fn stop_token(&self) -> StopToken {
        self.stop.clone()
    }

    /// Snapshot of the metrics accumulated so far.
    pub fn metrics(&self) -> PilotMetrics {
        self.metrics
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    /// Run `task` in the mode selected at construction.
    pub async fn run(&self, task: &str) -> Result<AgentRunResult, PilotLlmError> {
        let client = PilotLlmClient::from_config(&self.config, Some(self.metrics_callback()))?;
        match self.mode {
            AgentMode::Visual | AgentMode::Hybrid => {
                let agent = VisualAgent::new(
                    client,
                    self.bridge.clone(),
                    &self.config,
                    self.confirm.clone(),
                    self.events.clone(),
                    self.stop.clone(),
                    self.logger.clone(),
                );
                agent.run(task).await
            }
            AgentMode::Structural => {
                let parser: Box<dyn ActionParser> = if self.structured {
                    Box::new(StructuredParser)
                } else {
                    Box::new(FencedJsonParser)
                };
                let dispatcher =
                    ActionDispatcher::new(self.bridge.clone(), self.logger.clone());
                let agent = StructuralAgent::new(
                    client,
                    dispatcher,
                    parser,
                    self.structured,
                    &self.config,
                    self.confirm.clone(),
                    self.events.clone(),
                    self.stop.clone(),
                    self.logger.clone(),
                );
                agent.run(task).await
            }
        }
    }

    fn metrics_callback(&self) -> MetricsCallback {
        let metrics = Arc::clone(&self.metrics);
        Arc::new(move |response, duration, function| {
            let function = match function {
                Some("visual") => FunctionName::Visual,
                _ => FunctionName::Structural,
            };
            let (prompt, completion) = response
                .usage
                .as_ref()
                .map(|u| (u64::from(u.prompt_tokens), u64::from(u.completion_tokens)))
                .unwrap_or((0, 0));
            if let Ok(mut metrics) = metrics.lock() {
                metrics.record(function, prompt, completion, duration.as_millis() as u64);
            }
        })
    }
}

fn build_logger(config: &PilotConfig) -> PilotLogger {
    let mut log_config = LogConfig::new(config.verbose);
    if let Some(callback) = config.logger.clone() {
        log_config.external_logger = Some(Arc::new(move |record| {
            callback(&format!("[{}] {}", record.level.label(), record.message));
        }));
    }
    PilotLogger::with_config(log_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_follows_capability_matrix() {
        let config = PilotConfig {
            provider: "openai".to_string(),
            ..PilotConfig::default()
        };
        let matrix = CapabilityMatrix::builtin();
        assert_eq!(matrix.select_mode(&config.provider), AgentMode::Hybrid);

        let text_only = PilotConfig {
            provider: "deepseek".to_string(),
            ..PilotConfig::default()
        };
        assert_eq!(matrix.select_mode(&text_only.provider), AgentMode::Structural);
    }
}
