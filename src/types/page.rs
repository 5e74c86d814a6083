use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Pixel bounding box of an element at enumeration time.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct BoundingRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Logical viewport dimensions of the page.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// Scroll offset of the page at snapshot time.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct ScrollPosition {
    pub x: f64,
    pub y: f64,
}

/// Per-category counts of interactive elements, shown to the model so it
/// can decide whether a full enumeration is worthwhile.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ElementCounts {
    pub links: u32,
    pub buttons: u32,
    pub inputs: u32,
    pub forms: u32,
    pub images: u32,
}

/// Reference to the element currently holding focus, if any.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FocusedElement {
    pub tag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub input_type: Option<String>,
}

/// Compact snapshot of remote page state shown to the model once per turn.
///
/// A summary must always reflect the page as it is *now*; callers refresh it
/// after every batch of actions and never carry one across turns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PageSummary {
    pub url: String,
    pub title: String,
    pub viewport: Viewport,
    pub scroll: ScrollPosition,
    pub element_counts: ElementCounts,
    pub visible_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focused: Option<FocusedElement>,
}

impl PageSummary {
    /// Placeholder used when a refresh fails; the loop degrades to this
    /// rather than aborting the run.
    pub fn unknown() -> Self {
        Self {
            url: "about:unknown".to_string(),
            title: "(page state unavailable)".to_string(),
            viewport: Viewport::default(),
            scroll: ScrollPosition::default(),
            element_counts: ElementCounts::default(),
            visible_text: String::new(),
            focused: None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.url == "about:unknown"
    }
}

/// Coarse description of one interactive element from an enumeration.
///
/// The `index` is an ordinal into the enumeration that produced it and is
/// meaningless against any later enumeration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ElementInfo {
    pub index: u32,
    pub tag: String,
    #[serde(default)]
    pub text: String,
    pub visible: bool,
    pub enabled: bool,
    pub rect: BoundingRect,
}

/// Expensive per-element detail, fetched by index on demand.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ElementDetails {
    #[serde(flatten)]
    pub info: ElementInfo,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    pub selector: String,
    pub xpath: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_tag: Option<String>,
    #[serde(default)]
    pub child_count: u32,
}

/// Encoded screenshot with the logical viewport it was captured against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotData {
    /// Base64-encoded PNG bytes.
    pub data: String,
    pub width: u32,
    pub height: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_summary_is_marked() {
        let summary = PageSummary::unknown();
        assert!(summary.is_unknown());
        assert_eq!(summary.viewport, Viewport::default());
    }

    #[test]
    fn element_details_flattens_info() {
        let raw = json!({
            "index": 2,
            "tag": "a",
            "text": "Docs",
            "visible": true,
            "enabled": true,
            "rect": { "x": 1.0, "y": 2.0, "width": 30.0, "height": 12.0 },
            "attributes": { "href": "/docs" },
            "selector": "a[href='/docs']",
            "xpath": "/html/body/a[1]",
            "childCount": 0
        });

        let details: ElementDetails = serde_json::from_value(raw).expect("details");
        assert_eq!(details.info.index, 2);
        assert_eq!(
            details.attributes.get("href").map(String::as_str),
            Some("/docs")
        );
        assert!(details.parent_tag.is_none());
    }
}
