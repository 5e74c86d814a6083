//! Page-side helper script embedding.
//!
//! The dispatcher's element-addressed operations run through helpers
//! installed under `window.__webpilot`. Keeping the script in its own `.js`
//! file gives editors proper syntax highlighting while still bundling it as
//! a string at compile time.

/// Embedded contents of `scripts/dom_scripts.js`.
pub const WEBPILOT_DOM_SCRIPT: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/scripts/dom_scripts.js"
));

/// Expression that reports whether the helper bundle is already installed
/// in the current document.
pub const INJECTION_PROBE: &str = "typeof window.__webpilot !== 'undefined'";

/// Return the embedded helper script.
pub fn webpilot_dom_script() -> &'static str {
    WEBPILOT_DOM_SCRIPT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_script_is_non_empty() {
        assert!(!WEBPILOT_DOM_SCRIPT.trim().is_empty());
    }

    #[test]
    fn embedded_script_installs_expected_helpers() {
        for helper in [
            "pageSummary",
            "getElements",
            "getElementDetails",
            "clickIndex",
            "clickPoint",
            "typeText",
            "dragDrop",
        ] {
            assert!(
                WEBPILOT_DOM_SCRIPT.contains(helper),
                "dom script should install {helper}"
            );
        }
    }
}
