//! Confirmation-level policy for browser actions.
//!
//! [`classify`] is a pure function over the action and the page summary it
//! would run against. It holds no state and performs no IO, so the same
//! inputs always yield the same level. The loops call it immediately before
//! dispatch with the freshest summary they have.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::types::{ActionKind, BrowserAction, PageSummary};

/// How much human gating an action requires before dispatch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmLevel {
    /// Dispatch without asking.
    Auto,
    /// Dispatch, but surface a notification to the user.
    Notify,
    /// Hold until the user explicitly approves.
    Confirm,
    /// Never dispatch.
    Block,
}

impl fmt::Display for ConfirmLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConfirmLevel::Auto => "auto",
            ConfirmLevel::Notify => "notify",
            ConfirmLevel::Confirm => "confirm",
            ConfirmLevel::Block => "block",
        };
        f.write_str(name)
    }
}

/// Button/link labels that commit or destroy something. Lowercased
/// substring match, with common localized variants.
const DESTRUCTIVE_LABELS: &[&str] = &[
    "submit",
    "pay",
    "purchase",
    "buy",
    "order",
    "delete",
    "remove",
    "confirm",
    "checkout",
    "place order",
    "unsubscribe",
    "deactivate",
    "transfer",
    "send",
    "bezahlen",
    "kaufen",
    "löschen",
    "bestätigen",
    "payer",
    "acheter",
    "supprimer",
    "confirmer",
    "pagar",
    "comprar",
    "eliminar",
    "confirmar",
    "支付",
    "购买",
    "删除",
    "确认",
    "提交",
    "转账",
];

/// Terms marking a page where a committing click is consequential. Matched
/// against the lowercased url and visible-text excerpt.
const SENSITIVE_CONTEXT: &[&str] = &[
    "checkout",
    "payment",
    "billing",
    "invoice",
    "cart",
    "login",
    "signin",
    "sign-in",
    "password",
    "admin",
    "delete",
    "unsubscribe",
    "account",
    "bank",
    "banking",
    "transfer",
    "wallet",
    "结算",
    "支付",
    "登录",
    "银行",
];

/// Candidate run of 13 to 19 digits allowing single space or dash
/// separators, the shape of a payment card number.
static CARD_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d(?:[ -]?\d){12,18}").unwrap_or_else(|e| unreachable!("card pattern: {e}"))
});

fn looks_like_card_number(text: &str) -> bool {
    CARD_NUMBER.find_iter(text).any(|m| {
        let digits = m.as_str().chars().filter(char::is_ascii_digit).count();
        (13..=19).contains(&digits)
    })
}

fn label_is_destructive(label: &str) -> bool {
    let label = label.to_lowercase();
    DESTRUCTIVE_LABELS.iter().any(|term| label.contains(term))
}

fn context_is_sensitive(summary: &PageSummary) -> bool {
    let url = summary.url.to_lowercase();
    let text = summary.visible_text.to_lowercase();
    SENSITIVE_CONTEXT
        .iter()
        .any(|term| url.contains(term) || text.contains(term))
}

fn is_submit_key(action: &BrowserAction) -> bool {
    action
        .param_str("key")
        .map(|key| {
            let key = key.trim().to_lowercase();
            key == "enter" || key == "return" || key == "submit"
        })
        .unwrap_or(false)
}

/// Compute the confirmation level for `action` against the page it would run
/// on. Rules are priority-ordered; the first match wins.
pub fn classify(action: &BrowserAction, summary: &PageSummary) -> ConfirmLevel {
    // Arbitrary code execution and file disclosure are always gated.
    if matches!(action.kind, ActionKind::ExecuteJs | ActionKind::UploadFile) {
        return ConfirmLevel::Confirm;
    }

    if action.kind == ActionKind::Click {
        let label = action
            .param_str("label")
            .or_else(|| action.param_str("text"))
            .unwrap_or("");
        if label_is_destructive(label) && context_is_sensitive(summary) {
            return ConfirmLevel::Confirm;
        }
    }

    if action.kind == ActionKind::PressKey && is_submit_key(action) && context_is_sensitive(summary)
    {
        return ConfirmLevel::Confirm;
    }

    if action.kind == ActionKind::Type {
        let text = action.param_str("text").unwrap_or("");
        if looks_like_card_number(text) {
            return ConfirmLevel::Confirm;
        }
    }

    ConfirmLevel::Auto
}

/// One-line human-readable description of a pending action for a
/// confirmation prompt.
pub fn format_confirm_message(action: &BrowserAction, summary: &PageSummary) -> String {
    let what = match action.kind {
        ActionKind::ExecuteJs => "run custom JavaScript in the page".to_string(),
        ActionKind::UploadFile => {
            let path = action.param_str("path").unwrap_or("a file");
            format!("upload {path}")
        }
        ActionKind::Click => {
            let target = action
                .param_str("label")
                .or_else(|| action.param_str("text"))
                .or_else(|| action.param_str("selector"))
                .unwrap_or("an element");
            format!("click \"{target}\"")
        }
        ActionKind::Type => {
            let text = action.param_str("text").unwrap_or("");
            if looks_like_card_number(text) {
                "type what looks like a payment card number".to_string()
            } else {
                format!("type \"{text}\"")
            }
        }
        ActionKind::PressKey => {
            let key = action.param_str("key").unwrap_or("a key");
            format!("press {key}")
        }
        kind => format!("perform {kind}"),
    };
    format!("The assistant wants to {what} on {}", summary.url)
}
