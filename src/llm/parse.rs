//! Action extraction strategies for model output.
//!
//! Providers with native tool calling get [`StructuredParser`]; everything
//! else gets [`FencedJsonParser`], which pulls the first fenced JSON block
//! out of free text. The strategy is selected once at agent construction
//! from the capability matrix and never re-branched per turn.

use std::sync::LazyLock;

use async_openai::types::CreateChatCompletionResponse;
use regex::Regex;
use serde_json::Value;

use crate::types::{ActionKind, BrowserAction};

/// The assistant turn of one completion, reduced to what the loops consume.
#[derive(Debug, Clone, Default)]
pub struct ModelReply {
    pub text: String,
    /// (tool name, raw JSON arguments) pairs, in call order.
    pub tool_calls: Vec<(String, String)>,
}

impl ModelReply {
    pub fn from_response(response: &CreateChatCompletionResponse) -> Self {
        let Some(choice) = response.choices.first() else {
            return Self::default();
        };
        let text = choice.message.content.clone().unwrap_or_default();
        let tool_calls = choice
            .message
            .tool_calls
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|call| (call.function.name.clone(), call.function.arguments.clone()))
            .collect();
        Self { text, tool_calls }
    }
}

/// Strategy for turning one model reply into zero or more actions.
///
/// Parsers never fail; anything unusable simply contributes no actions, and
/// the loop treats an empty result as "the model is done".
pub trait ActionParser: Send + Sync {
    fn parse(&self, reply: &ModelReply) -> Vec<BrowserAction>;
}

/// Parser for native tool invocations. Calls whose name is not in the
/// action vocabulary, or whose arguments fail to parse, are dropped
/// silently.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredParser;

impl ActionParser for StructuredParser {
    fn parse(&self, reply: &ModelReply) -> Vec<BrowserAction> {
        reply
            .tool_calls
            .iter()
            .filter_map(|(name, arguments)| {
                let args: Value = serde_json::from_str(arguments).ok()?;
                if let Some(kind) = ActionKind::from_name(name) {
                    let mut action = BrowserAction::new(kind);
                    if let Value::Object(map) = args {
                        action.params = map;
                    }
                    return Some(action);
                }
                // Single generic tool whose arguments carry the kind.
                serde_json::from_value::<BrowserAction>(args).ok()
            })
            .collect()
    }
}

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*(.*?)```")
        .unwrap_or_else(|e| unreachable!("fenced block pattern: {e}"))
});

/// Parser for providers without structured calling: extracts the first
/// fenced JSON object or array from the reply text. A reply with no
/// parseable block yields zero actions.
#[derive(Debug, Default, Clone, Copy)]
pub struct FencedJsonParser;

impl ActionParser for FencedJsonParser {
    fn parse(&self, reply: &ModelReply) -> Vec<BrowserAction> {
        for capture in FENCED_BLOCK.captures_iter(&reply.text) {
            let Some(block) = capture.get(1) else {
                continue;
            };
            let Ok(value) = serde_json::from_str::<Value>(block.as_str().trim()) else {
                continue;
            };
            return match value {
                Value::Array(items) => items
                    .into_iter()
                    .filter_map(|item| serde_json::from_value::<BrowserAction>(item).ok())
                    .collect(),
                object @ Value::Object(_) => {
                    serde_json::from_value::<BrowserAction>(object)
                        .map(|action| vec![action])
                        .unwrap_or_default()
                }
                _ => Vec::new(),
            };
        }
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply_with_text(text: &str) -> ModelReply {
        ModelReply {
            text: text.to_string(),
            tool_calls: Vec::new(),
        }
    }

    #[test]
    fn structured_parser_maps_tool_names_to_kinds() {
        let reply = ModelReply {
            text: String::new(),
            tool_calls: vec![
                ("click".to_string(), r#"{"index": 3}"#.to_string()),
                ("getElements".to_string(), "{}".to_string()),
            ],
        };
        let actions = StructuredParser.parse(&reply);
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[0].kind, ActionKind::Click);
        assert_eq!(actions[0].param_u64("index"), Some(3));
        assert_eq!(actions[1].kind, ActionKind::GetElements);
    }

    #[test]
    fn structured_parser_drops_unknown_tools_silently() {
        let reply = ModelReply {
            text: String::new(),
            tool_calls: vec![
                ("teleport".to_string(), "{}".to_string()),
                ("scroll".to_string(), r#"{"dy": 400}"#.to_string()),
            ],
        };
        let actions = StructuredParser.parse(&reply);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].kind, ActionKind::Scroll);
    }

    #[test]
    fn structured_parser_accepts_generic_wrapper_tool() {
        let reply = ModelReply {
            text: String::new(),
            tool_calls: vec![(
                "browser".to_string(),
                r#"{"action": "navigate", "url": "https://example.com"}"#.to_string(),
            )],
        };
        let actions = StructuredParser.parse(&reply);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].kind, ActionKind::Navigate);
    }

    #[test]
    fn fenced_parser_extracts_array() {
        let reply = reply_with_text(
            "I will enumerate first.\n```json\n[{\"action\": \"getElements\"}, {\"action\": \"click\", \"index\": 1}]\n```",
        );
        let actions = FencedJsonParser.parse(&reply);
        assert_eq!(actions.len(), 2);
        assert_eq!(actions[1].kind, ActionKind::Click);
    }

    #[test]
    fn fenced_parser_extracts_single_object() {
        let reply = reply_with_text("```\n{\"action\": \"refresh\"}\n```");
        let actions = FencedJsonParser.parse(&reply);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].kind, ActionKind::Refresh);
    }

    #[test]
    fn fenced_parser_yields_nothing_for_prose() {
        let actions = FencedJsonParser.parse(&reply_with_text("All done, the form is submitted."));
        assert!(actions.is_empty());
    }

    #[test]
    fn fenced_parser_skips_unparseable_blocks() {
        let reply = reply_with_text(
            "```json\nnot json at all\n```\n```json\n{\"action\": \"goBack\"}\n```",
        );
        let actions = FencedJsonParser.parse(&reply);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].kind, ActionKind::GoBack);
    }

    #[test]
    fn fenced_parser_drops_invalid_kinds_within_array() {
        let reply = reply_with_text(
            "```json\n[{\"action\": \"fly\"}, {\"action\": \"wait\", \"ms\": 500}]\n```",
        );
        let actions = FencedJsonParser.parse(&reply);
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].kind, ActionKind::Wait);
    }
}
