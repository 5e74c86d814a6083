//! Core data structures for the browser-control loops.
//!
//! These strongly-typed models are the shared vocabulary between the
//! dispatcher, safety classifier, prompt builder, and the agent loops.

pub mod action;
pub mod chat;
pub mod page;

pub use action::{ActionKind, ActionResult, BrowserAction};
pub use chat::{ChatRole, ContentPart, ConversationMessage, ImageUrl, MessageContent};
pub use page::{
    BoundingRect, ElementCounts, ElementDetails, ElementInfo, FocusedElement, PageSummary,
    ScreenshotData, ScrollPosition, Viewport,
};
