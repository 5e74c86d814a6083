//! Strongly-typed configuration for the webpilot agent loops.
//!
//! Configuration values can be constructed from defaults, loaded from
//! environment variables (with optional `.env` support), or merged with
//! explicit overrides. Settle delays and turn ceilings are named fields
//! here rather than constants at their use sites; they are empirical
//! tunables, not invariants.

use std::env;
use std::fmt;
use std::num::ParseIntError;
use std::path::PathBuf;
use std::sync::Arc;

use dotenvy::dotenv;
use serde::de::{Deserialize, Deserializer, Error as DeError};
use serde::ser::{Serialize, Serializer};
use serde::{Deserialize as DeriveDeserialize, Serialize as DeriveSerialize};
use thiserror::Error;

/// Shared logger callback signature used by the configuration.
pub type LoggerCallback = Arc<dyn Fn(&str) + Send + Sync + 'static>;

/// Hard bounds on the agent turn ceiling.
pub const MIN_TURNS: u32 = 1;
pub const MAX_TURNS: u32 = 100;

/// Verbosity level for webpilot logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Minimal,
    Medium,
    Detailed,
}

impl Verbosity {
    fn as_u8(self) -> u8 {
        match self {
            Verbosity::Minimal => 0,
            Verbosity::Medium => 1,
            Verbosity::Detailed => 2,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Verbosity::Minimal),
            1 => Some(Verbosity::Medium),
            2 => Some(Verbosity::Detailed),
            _ => None,
        }
    }
}

impl Default for Verbosity {
    fn default() -> Self {
        Verbosity::Medium
    }
}

impl Serialize for Verbosity {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for Verbosity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = u8::deserialize(deserializer)?;
        Verbosity::from_u8(value).ok_or_else(|| {
            DeError::custom(format!(
                "invalid verbosity value {value}; expected 0, 1, or 2"
            ))
        })
    }
}

/// Configuration values for a webpilot agent run.
#[derive(DeriveSerialize, DeriveDeserialize, Clone)]
#[serde(default)]
pub struct PilotConfig {
    /// Provider id used for capability lookups (e.g. "openai", "anthropic").
    pub provider: String,
    /// Model name passed through to the inference endpoint.
    pub model: String,
    #[serde(alias = "modelApiKey")]
    pub model_api_key: Option<String>,
    #[serde(alias = "apiBase")]
    pub api_base: Option<String>,
    /// Structural-loop turn ceiling; clamped to `[MIN_TURNS, MAX_TURNS]`.
    #[serde(alias = "maxTurns")]
    pub max_turns: u32,
    #[serde(alias = "visualMaxTurns")]
    pub visual_max_turns: u32,
    /// Pause after each dispatched action before the next one.
    #[serde(alias = "actionSettleMs")]
    pub action_settle_ms: u64,
    /// Visual loop: pause after in-place interactions before recapture.
    #[serde(alias = "visualSettleMs")]
    pub visual_settle_ms: u64,
    /// Visual loop: pause after navigation-class actions before recapture.
    #[serde(alias = "visualNavSettleMs")]
    pub visual_nav_settle_ms: u64,
    /// Bound on waiting for a page load before a capture.
    #[serde(alias = "pageLoadTimeoutMs")]
    pub page_load_timeout_ms: u64,
    /// Bound on waiting for a confirmation response; expiry fails closed.
    #[serde(alias = "confirmTimeoutMs")]
    pub confirm_timeout_ms: u64,
    /// Extra operator instructions appended to the system prompt.
    #[serde(alias = "systemPrompt")]
    pub system_prompt: Option<String>,
    pub verbose: Verbosity,
    #[serde(skip_serializing, skip_deserializing)]
    pub logger: Option<LoggerCallback>,
    pub headless: bool,
    #[serde(alias = "chromeExecutable")]
    pub chrome_executable: Option<PathBuf>,
    /// Attach to an existing browser over CDP instead of launching one.
    #[serde(alias = "cdpUrl")]
    pub cdp_url: Option<String>,
}

impl Default for PilotConfig {
    fn default() -> Self {
        PilotConfig {
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            model_api_key: None,
            api_base: None,
            max_turns: 25,
            visual_max_turns: 30,
            action_settle_ms: 300,
            visual_settle_ms: 2_500,
            visual_nav_settle_ms: 5_000,
            page_load_timeout_ms: 10_000,
            confirm_timeout_ms: 60_000,
            system_prompt: None,
            verbose: Verbosity::default(),
            logger: None,
            headless: true,
            chrome_executable: None,
            cdp_url: None,
        }
    }
}

impl PilotConfig {
    /// Construct a configuration by reading relevant environment variables,
    /// after loading a `.env` file if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenv();
        let mut config = PilotConfig::default();

        if let Some(value) = env_var("WEBPILOT_PROVIDER") {
            config.provider = value;
        }
        if let Some(value) = env_var("WEBPILOT_MODEL") {
            config.model = value;
        }
        if let Some(value) = env_var("MODEL_API_KEY").or_else(|| env_var("OPENAI_API_KEY")) {
            config.model_api_key = Some(value);
        }
        if let Some(value) = env_var("WEBPILOT_API_BASE") {
            config.api_base = Some(value);
        }
        if let Some(value) = env_var("WEBPILOT_MAX_TURNS") {
            config.max_turns = parse_u32("WEBPILOT_MAX_TURNS", &value)?;
        }
        if let Some(value) = env_var("WEBPILOT_VISUAL_MAX_TURNS") {
            config.visual_max_turns = parse_u32("WEBPILOT_VISUAL_MAX_TURNS", &value)?;
        }
        if let Some(value) = env_var("WEBPILOT_ACTION_SETTLE_MS") {
            config.action_settle_ms = parse_u64("WEBPILOT_ACTION_SETTLE_MS", &value)?;
        }
        if let Some(value) = env_var("WEBPILOT_VISUAL_SETTLE_MS") {
            config.visual_settle_ms = parse_u64("WEBPILOT_VISUAL_SETTLE_MS", &value)?;
        }
        if let Some(value) = env_var("WEBPILOT_VISUAL_NAV_SETTLE_MS") {
            config.visual_nav_settle_ms = parse_u64("WEBPILOT_VISUAL_NAV_SETTLE_MS", &value)?;
        }
        if let Some(value) = env_var("WEBPILOT_PAGE_LOAD_TIMEOUT_MS") {
            config.page_load_timeout_ms = parse_u64("WEBPILOT_PAGE_LOAD_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = env_var("WEBPILOT_CONFIRM_TIMEOUT_MS") {
            config.confirm_timeout_ms = parse_u64("WEBPILOT_CONFIRM_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = env_var("WEBPILOT_SYSTEM_PROMPT") {
            config.system_prompt = Some(value);
        }
        if let Some(value) = env_var("WEBPILOT_VERBOSE") {
            let parsed = parse_u8("WEBPILOT_VERBOSE", &value)?;
            config.verbose = Verbosity::from_u8(parsed)
                .ok_or_else(|| ConfigError::invalid_enum("WEBPILOT_VERBOSE", parsed.to_string()))?;
        }
        if let Some(value) = env_var("WEBPILOT_HEADLESS") {
            config.headless = parse_bool("WEBPILOT_HEADLESS", &value)?;
        }
        if let Some(value) = env_var("WEBPILOT_CHROME_BIN") {
            config.chrome_executable = Some(PathBuf::from(value));
        }
        if let Some(value) = env_var("WEBPILOT_CDP_URL") {
            config.cdp_url = Some(value);
        }

        Ok(config)
    }

    /// Turn ceiling bounded to a sane range regardless of configuration.
    pub fn clamped_max_turns(&self) -> u32 {
        self.max_turns.clamp(MIN_TURNS, MAX_TURNS)
    }

    pub fn clamped_visual_max_turns(&self) -> u32 {
        self.visual_max_turns.clamp(MIN_TURNS, MAX_TURNS)
    }

    /// Create a new configuration with explicit field overrides applied.
    pub fn with_overrides(&self, overrides: PilotConfigOverrides) -> PilotConfig {
        let mut next = self.clone();

        if let Some(value) = overrides.provider {
            next.provider = value;
        }
        if let Some(value) = overrides.model {
            next.model = value;
        }
        if let Some(value) = overrides.model_api_key {
            next.model_api_key = value;
        }
        if let Some(value) = overrides.api_base {
            next.api_base = value;
        }
        if let Some(value) = overrides.max_turns {
            next.max_turns = value;
        }
        if let Some(value) = overrides.visual_max_turns {
            next.visual_max_turns = value;
        }
        if let Some(value) = overrides.action_settle_ms {
            next.action_settle_ms = value;
        }
        if let Some(value) = overrides.visual_settle_ms {
            next.visual_settle_ms = value;
        }
        if let Some(value) = overrides.visual_nav_settle_ms {
            next.visual_nav_settle_ms = value;
        }
        if let Some(value) = overrides.page_load_timeout_ms {
            next.page_load_timeout_ms = value;
        }
        if let Some(value) = overrides.confirm_timeout_ms {
            next.confirm_timeout_ms = value;
        }
        if let Some(value) = overrides.system_prompt {
            next.system_prompt = value;
        }
        if let Some(value) = overrides.verbose {
            next.verbose = value;
        }
        if let Some(value) = overrides.logger {
            next.logger = value;
        }
        if let Some(value) = overrides.headless {
            next.headless = value;
        }
        if let Some(value) = overrides.chrome_executable {
            next.chrome_executable = value;
        }
        if let Some(value) = overrides.cdp_url {
            next.cdp_url = value;
        }

        next
    }
}

/// Field-level overrides for [`PilotConfig::with_overrides`].
#[derive(Default, Clone)]
pub struct PilotConfigOverrides {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub model_api_key: Option<Option<String>>,
    pub api_base: Option<Option<String>>,
    pub max_turns: Option<u32>,
    pub visual_max_turns: Option<u32>,
    pub action_settle_ms: Option<u64>,
    pub visual_settle_ms: Option<u64>,
    pub visual_nav_settle_ms: Option<u64>,
    pub page_load_timeout_ms: Option<u64>,
    pub confirm_timeout_ms: Option<u64>,
    pub system_prompt: Option<Option<String>>,
    pub verbose: Option<Verbosity>,
    pub logger: Option<Option<LoggerCallback>>,
    pub headless: Option<bool>,
    pub chrome_executable: Option<Option<PathBuf>>,
    pub cdp_url: Option<Option<String>>,
}

impl fmt::Debug for PilotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PilotConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("model_api_key_present", &self.model_api_key.is_some())
            .field("api_base", &self.api_base)
            .field("max_turns", &self.max_turns)
            .field("visual_max_turns", &self.visual_max_turns)
            .field("action_settle_ms", &self.action_settle_ms)
            .field("visual_settle_ms", &self.visual_settle_ms)
            .field("visual_nav_settle_ms", &self.visual_nav_settle_ms)
            .field("page_load_timeout_ms", &self.page_load_timeout_ms)
            .field("confirm_timeout_ms", &self.confirm_timeout_ms)
            .field("system_prompt", &self.system_prompt)
            .field("verbose", &self.verbose)
            .field("logger_present", &self.logger.is_some())
            .field("headless", &self.headless)
            .field("chrome_executable", &self.chrome_executable)
            .field("cdp_url", &self.cdp_url)
            .finish()
    }
}

/// Errors that can arise while constructing a [`PilotConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {field}")]
    InvalidEnumVariant { field: &'static str, value: String },
    #[error("invalid boolean '{value}' for {field}")]
    InvalidBool { field: &'static str, value: String },
    #[error("invalid number '{value}' for {field}: {source}")]
    InvalidNumber {
        field: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },
}

impl ConfigError {
    fn invalid_enum(field: &'static str, value: String) -> Self {
        ConfigError::InvalidEnumVariant { field, value }
    }
}

fn env_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_bool(field: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            field,
            value: value.to_string(),
        }),
    }
}

fn parse_u8(field: &'static str, value: &str) -> Result<u8, ConfigError> {
    value
        .trim()
        .parse::<u8>()
        .map_err(|source| ConfigError::InvalidNumber {
            field,
            value: value.to_string(),
            source,
        })
}

fn parse_u32(field: &'static str, value: &str) -> Result<u32, ConfigError> {
    value
        .trim()
        .parse::<u32>()
        .map_err(|source| ConfigError::InvalidNumber {
            field,
            value: value.to_string(),
            source,
        })
}

fn parse_u64(field: &'static str, value: &str) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|source| ConfigError::InvalidNumber {
            field,
            value: value.to_string(),
            source,
        })
}
