//! System and user prompt rendering for the control loops.

use std::fmt::Write as _;

use crate::capability::AgentMode;
use crate::types::{ActionKind, PageSummary};

const BASE_INSTRUCTIONS: &str = "\
You are a browser automation assistant. You control a live web page on \
behalf of the user by emitting actions from a fixed vocabulary. Work in \
small, verifiable steps and stop as soon as the task is done.

Mandatory workflow:
1. Observe the page summary you are given each turn.
2. When you need to interact with the page, FIRST call getElements to \
enumerate interactive elements. Elements are addressed by their numeric \
index from that enumeration.
3. Call getElementDetails with an index only when the coarse listing is \
not enough to decide.
4. Act by index. Indices are only valid until the next enumeration; after \
any action that changes the page, enumerate again before reusing one.

Rules:
- Prefer element indices over CSS selectors, and selectors over raw \
coordinates.
- navigate takes a full URL; issue it instead of clicking through menus \
when you already know the destination.
- When the task is complete, respond with a short summary of what was \
done and emit no further actions.
- If the task cannot be completed, say why and emit no further actions.";

const COORDINATE_GUIDANCE: &str = "\
You may also receive screenshots. Coordinates in your actions use a \
0-1000 normalized grid over the viewport: (0,0) is the top-left corner \
and (1000,1000) the bottom-right, independent of the real pixel size. \
Use coordinates only when no element index addresses the target.";

/// Fixed system instructions for a run, listing the action vocabulary and
/// the enumerate-then-act workflow.
pub fn build_system_prompt(mode: AgentMode) -> String {
    let mut prompt = String::from(BASE_INSTRUCTIONS);
    prompt.push_str("\n\nAvailable actions: ");
    for (i, kind) in ActionKind::ALL.iter().enumerate() {
        if i > 0 {
            prompt.push_str(", ");
        }
        prompt.push_str(kind.as_str());
    }
    prompt.push('.');
    if matches!(mode, AgentMode::Visual | AgentMode::Hybrid) {
        prompt.push_str("\n\n");
        prompt.push_str(COORDINATE_GUIDANCE);
    }
    prompt
}

/// Render the per-turn user message: current page state plus the task.
pub fn build_user_message(task: &str, summary: &PageSummary) -> String {
    let mut message = String::new();
    let _ = writeln!(message, "Current page:");
    let _ = writeln!(message, "- URL: {}", summary.url);
    let _ = writeln!(message, "- Title: {}", summary.title);
    let _ = writeln!(
        message,
        "- Viewport: {}x{} (scrolled to {:.0},{:.0})",
        summary.viewport.width, summary.viewport.height, summary.scroll.x, summary.scroll.y
    );
    let counts = &summary.element_counts;
    let _ = writeln!(
        message,
        "- Elements: {} links, {} buttons, {} inputs, {} forms, {} images",
        counts.links, counts.buttons, counts.inputs, counts.forms, counts.images
    );
    if let Some(focused) = &summary.focused {
        let _ = writeln!(message, "- Focused element: <{}>", focused.tag);
    }
    if !summary.visible_text.is_empty() {
        let _ = writeln!(message, "\nVisible text (excerpt):\n{}", summary.visible_text);
    }
    let _ = write!(message, "\nTask: {task}");
    message
}

/// System prompt variant for providers without structured calling: the base
/// instructions plus an explicit output contract the text parser can rely
/// on.
pub fn build_fallback_prompt(mode: AgentMode) -> String {
    let mut prompt = build_system_prompt(mode);
    prompt.push_str(
        "\n\nOutput contract: when you want to act, reply with exactly one \
fenced ```json block containing either a single action object or an array \
of action objects. Each object has an \"action\" field naming the action \
kind plus its parameters, for example:\n\
```json\n\
[{\"action\": \"click\", \"index\": 3}]\n\
```\n\
Reply with no fenced block at all when the task is finished.",
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ElementCounts, ScrollPosition, Viewport};

    fn summary() -> PageSummary {
        PageSummary {
            url: "https://example.com/docs".to_string(),
            title: "Docs".to_string(),
            viewport: Viewport {
                width: 1280,
                height: 800,
            },
            scroll: ScrollPosition { x: 0.0, y: 240.0 },
            element_counts: ElementCounts {
                links: 12,
                buttons: 3,
                inputs: 1,
                forms: 1,
                images: 4,
            },
            visible_text: "Getting started".to_string(),
            focused: None,
        }
    }

    #[test]
    fn system_prompt_lists_every_action_kind() {
        let prompt = build_system_prompt(AgentMode::Structural);
        for kind in ActionKind::ALL {
            assert!(prompt.contains(kind.as_str()), "missing {kind}");
        }
        assert!(prompt.contains("getElements"));
    }

    #[test]
    fn coordinate_guidance_only_in_visual_modes() {
        assert!(!build_system_prompt(AgentMode::Structural).contains("0-1000"));
        assert!(build_system_prompt(AgentMode::Hybrid).contains("0-1000"));
        assert!(build_system_prompt(AgentMode::Visual).contains("0-1000"));
    }

    #[test]
    fn user_message_renders_page_state_and_task() {
        let message = build_user_message("find the install guide", &summary());
        assert!(message.contains("https://example.com/docs"));
        assert!(message.contains("1280x800"));
        assert!(message.contains("12 links"));
        assert!(message.contains("Getting started"));
        assert!(message.ends_with("Task: find the install guide"));
    }

    #[test]
    fn fallback_prompt_appends_output_contract() {
        let prompt = build_fallback_prompt(AgentMode::Structural);
        assert!(prompt.contains("```json"));
        assert!(prompt.contains("fenced"));
        assert!(prompt.len() > build_system_prompt(AgentMode::Structural).len());
    }
}
