//! Progress events and run lifecycle types shared by both loops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::types::{ActionResult, BrowserAction, ConversationMessage};

/// Terminal state of a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum RunStatus {
    Completed,
    Stopped,
    ExhaustedTurns,
}

/// Tagged progress event streamed to the caller while a run is in flight.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum AgentEvent {
    /// A new turn is starting.
    Turn { turn: u32, max_turns: u32 },
    /// Intermediate model text.
    Text { text: String },
    /// An action is about to be dispatched.
    Action { action: BrowserAction },
    /// Outcome of a dispatched action. Tagged `result` on the wire.
    #[serde(rename = "result")]
    ActionResult {
        action: BrowserAction,
        result: ActionResult,
    },
    /// An action was withheld by the safety gate.
    Skipped { action: BrowserAction, reason: String },
    /// The run finished.
    Complete { status: RunStatus, message: String },
}

/// Fan-out handle for [`AgentEvent`]s. Without an attached channel every
/// emit is a no-op, as is emitting after the receiver is dropped; progress
/// reporting never fails a run.
#[derive(Clone, Default)]
pub struct EventSink {
    sender: Option<mpsc::UnboundedSender<AgentEvent>>,
}

impl EventSink {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<AgentEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender: Some(sender),
            },
            receiver,
        )
    }

    pub fn emit(&self, event: AgentEvent) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(event);
        }
    }
}

/// Shared abort flag. The loops poll it at turn boundaries only, so an
/// in-flight model or action call always finishes before the run stops.
#[derive(Clone, Debug, Default)]
pub struct StopToken {
    flag: Arc<AtomicBool>,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Final outcome of a run, with the transcript the loop accumulated.
#[derive(Debug, Clone)]
pub struct AgentRunResult {
    pub status: RunStatus,
    pub message: String,
    pub turns_used: u32,
    pub transcript: Vec<ConversationMessage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_token_is_shared_across_clones() {
        let token = StopToken::new();
        let clone = token.clone();
        assert!(!clone.is_stopped());
        token.stop();
        assert!(clone.is_stopped());
    }

    #[test]
    fn disabled_sink_swallows_events() {
        let sink = EventSink::disabled();
        sink.emit(AgentEvent::Text {
            text: "hello".to_string(),
        });
    }

    #[tokio::test]
    async fn channel_sink_delivers_in_order() {
        let (sink, mut receiver) = EventSink::channel();
        sink.emit(AgentEvent::Turn {
            turn: 1,
            max_turns: 25,
        });
        sink.emit(AgentEvent::Text {
            text: "working".to_string(),
        });
        assert!(matches!(
            receiver.recv().await,
            Some(AgentEvent::Turn { turn: 1, .. })
        ));
        assert!(matches!(receiver.recv().await, Some(AgentEvent::Text { .. })));
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = AgentEvent::Complete {
            status: RunStatus::Completed,
            message: "done".to_string(),
        };
        let value = serde_json::to_value(&event).expect("serialize");
        assert_eq!(value["type"], "complete");
        assert_eq!(value["status"], "completed");
    }

    #[test]
    fn action_outcome_event_uses_result_tag() {
        use crate::types::ActionKind;

        let event = AgentEvent::ActionResult {
            action: BrowserAction::new(ActionKind::Click),
            result: ActionResult::ok("clicked Home"),
        };
        let value = serde_json::to_value(&event).expect("serialize");
        assert_eq!(value["type"], "result");
        assert_eq!(value["result"]["success"], true);
    }
}
