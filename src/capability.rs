//! Provider capability matrix.
//!
//! The matrix is an explicitly constructed lookup table injected into agent
//! construction; there is no hidden global registry. Unknown providers
//! default to no structured calling and no vision, which routes them to the
//! structural loop with text-fallback parsing.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// What a model provider can do, as far as the loops care.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderCapabilities {
    pub supports_structured_calls: bool,
    pub supports_vision: bool,
}

/// Operating mode derived from provider capabilities.
///
/// `Hybrid` providers get the visual loop; `Structural` providers reason
/// over element indices only. The mode is selected once per run and never
/// switched mid-run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AgentMode {
    Structural,
    Visual,
    Hybrid,
}

/// Static provider id → capabilities table.
#[derive(Debug, Clone, Default)]
pub struct CapabilityMatrix {
    entries: HashMap<String, ProviderCapabilities>,
}

impl CapabilityMatrix {
    /// Empty table; every lookup falls back to the all-false default.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Table seeded with the providers webpilot ships support for.
    pub fn builtin() -> Self {
        let mut matrix = Self::empty();
        matrix.insert(
            "openai",
            ProviderCapabilities {
                supports_structured_calls: true,
                supports_vision: true,
            },
        );
        matrix.insert(
            "anthropic",
            ProviderCapabilities {
                supports_structured_calls: true,
                supports_vision: true,
            },
        );
        matrix.insert(
            "google",
            ProviderCapabilities {
                supports_structured_calls: true,
                supports_vision: true,
            },
        );
        matrix.insert(
            "deepseek",
            ProviderCapabilities {
                supports_structured_calls: true,
                supports_vision: false,
            },
        );
        matrix.insert(
            "groq",
            ProviderCapabilities {
                supports_structured_calls: true,
                supports_vision: false,
            },
        );
        matrix.insert(
            "mistral",
            ProviderCapabilities {
                supports_structured_calls: true,
                supports_vision: false,
            },
        );
        matrix.insert(
            "ollama",
            ProviderCapabilities {
                supports_structured_calls: false,
                supports_vision: false,
            },
        );
        matrix
    }

    pub fn insert(&mut self, provider: impl Into<String>, capabilities: ProviderCapabilities) {
        self.entries
            .insert(provider.into().to_ascii_lowercase(), capabilities);
    }

    /// Look up a provider; unknown ids get the all-false default.
    pub fn capabilities(&self, provider: &str) -> ProviderCapabilities {
        self.entries
            .get(&provider.trim().to_ascii_lowercase())
            .copied()
            .unwrap_or_default()
    }

    /// Vision-capable providers operate in hybrid mode, everything else is
    /// structural.
    pub fn select_mode(&self, provider: &str) -> AgentMode {
        if self.capabilities(provider).supports_vision {
            AgentMode::Hybrid
        } else {
            AgentMode::Structural
        }
    }

    /// Whether model output should be parsed as native structured tool
    /// invocations rather than a fenced JSON block in free text.
    pub fn uses_structured_parsing(&self, provider: &str) -> bool {
        self.capabilities(provider).supports_structured_calls
    }

    pub fn providers(&self) -> impl Iterator<Item = (&str, ProviderCapabilities)> {
        self.entries.iter().map(|(id, caps)| (id.as_str(), *caps))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_is_hybrid_iff_vision_for_every_entry() {
        let matrix = CapabilityMatrix::builtin();
        let providers: Vec<String> = matrix
            .providers()
            .map(|(id, _)| id.to_string())
            .collect();
        for provider in providers {
            let caps = matrix.capabilities(&provider);
            let mode = matrix.select_mode(&provider);
            if caps.supports_vision {
                assert_eq!(mode, AgentMode::Hybrid, "{provider}");
            } else {
                assert_eq!(mode, AgentMode::Structural, "{provider}");
            }
        }
    }

    #[test]
    fn unknown_provider_defaults_to_all_false() {
        let matrix = CapabilityMatrix::builtin();
        let caps = matrix.capabilities("definitely-not-registered");
        assert!(!caps.supports_structured_calls);
        assert!(!caps.supports_vision);
        assert_eq!(
            matrix.select_mode("definitely-not-registered"),
            AgentMode::Structural
        );
        assert!(!matrix.uses_structured_parsing("definitely-not-registered"));
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let matrix = CapabilityMatrix::builtin();
        assert!(matrix.capabilities("OpenAI").supports_vision);
        assert!(matrix.uses_structured_parsing(" Anthropic "));
    }

    #[test]
    fn injected_entries_override_nothing_globally() {
        let mut custom = CapabilityMatrix::empty();
        custom.insert(
            "inhouse",
            ProviderCapabilities {
                supports_structured_calls: true,
                supports_vision: true,
            },
        );
        assert_eq!(custom.select_mode("inhouse"), AgentMode::Hybrid);

        // A fresh builtin table is unaffected by the custom one.
        let builtin = CapabilityMatrix::builtin();
        assert_eq!(builtin.select_mode("inhouse"), AgentMode::Structural);
    }
}
