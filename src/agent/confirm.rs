//! Human confirmation gate for safety-flagged actions.
//!
//! Confirmation is an explicit request/response channel to whatever owns
//! the user interface. The loop blocks only on that channel, with a bounded
//! wait; a timeout, a dropped receiver, or a missing channel all read as
//! denial. The gate fails closed.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::types::BrowserAction;

/// One pending confirmation. The consumer answers by sending on `respond`;
/// dropping it counts as denial.
#[derive(Debug)]
pub struct ConfirmRequest {
    pub action: BrowserAction,
    pub message: String,
    pub respond: oneshot::Sender<bool>,
}

#[derive(Clone)]
pub struct ConfirmGate {
    sender: Option<mpsc::Sender<ConfirmRequest>>,
    timeout: Duration,
}

impl ConfirmGate {
    /// Gate with no consumer attached; every request is denied.
    pub fn deny_all() -> Self {
        Self {
            sender: None,
            timeout: Duration::ZERO,
        }
    }

    /// Gate wired to a consumer channel. Requests unanswered within
    /// `timeout_ms` are denied.
    pub fn channel(timeout_ms: u64) -> (Self, mpsc::Receiver<ConfirmRequest>) {
        let (sender, receiver) = mpsc::channel(8);
        (
            Self {
                sender: Some(sender),
                timeout: Duration::from_millis(timeout_ms),
            },
            receiver,
        )
    }

    /// Ask for approval of `action`. Returns `true` only on an explicit
    /// approval inside the time bound.
    pub async fn request(&self, action: &BrowserAction, message: String) -> bool {
        let Some(sender) = &self.sender else {
            return false;
        };
        let (respond, response) = oneshot::channel();
        let request = ConfirmRequest {
            action: action.clone(),
            message,
            respond,
        };
        if sender.send(request).await.is_err() {
            return false;
        }
        match tokio::time::timeout(self.timeout, response).await {
            Ok(Ok(approved)) => approved,
            // Timed out or the responder was dropped.
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ActionKind;

    fn action() -> BrowserAction {
        BrowserAction::new(ActionKind::ExecuteJs)
    }

    #[tokio::test]
    async fn missing_channel_denies() {
        let gate = ConfirmGate::deny_all();
        assert!(!gate.request(&action(), "run script?".to_string()).await);
    }

    #[tokio::test]
    async fn explicit_approval_passes() {
        let (gate, mut receiver) = ConfirmGate::channel(1_000);
        let consumer = tokio::spawn(async move {
            let request = receiver.recv().await.expect("request");
            assert!(request.message.contains("script"));
            let _ = request.respond.send(true);
        });
        assert!(gate.request(&action(), "run script?".to_string()).await);
        consumer.await.expect("consumer");
    }

    #[tokio::test]
    async fn explicit_denial_fails() {
        let (gate, mut receiver) = ConfirmGate::channel(1_000);
        tokio::spawn(async move {
            let request = receiver.recv().await.expect("request");
            let _ = request.respond.send(false);
        });
        assert!(!gate.request(&action(), "run script?".to_string()).await);
    }

    #[tokio::test]
    async fn dropped_responder_denies() {
        let (gate, mut receiver) = ConfirmGate::channel(1_000);
        tokio::spawn(async move {
            let request = receiver.recv().await.expect("request");
            drop(request.respond);
        });
        assert!(!gate.request(&action(), "run script?".to_string()).await);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_denies() {
        let (gate, _receiver) = ConfirmGate::channel(5_000);
        // Receiver is held but never answers; paused time fast-forwards
        // through the bounded wait.
        assert!(!gate.request(&action(), "run script?".to_string()).await);
    }
}
