use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value};

/// Closed vocabulary of browser actions a model may propose.
///
/// Anything outside this set is dropped during extraction rather than
/// surfaced as an error, so the wire names here are the contract shared
/// with the prompt builder and the tool schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    #[serde(rename = "click")]
    Click,
    #[serde(rename = "type")]
    Type,
    #[serde(rename = "scroll")]
    Scroll,
    #[serde(rename = "navigate")]
    Navigate,
    #[serde(rename = "screenshot")]
    Screenshot,
    #[serde(rename = "wait")]
    Wait,
    #[serde(rename = "hover")]
    Hover,
    #[serde(rename = "select")]
    Select,
    #[serde(rename = "pressKey")]
    PressKey,
    #[serde(rename = "goBack")]
    GoBack,
    #[serde(rename = "goForward")]
    GoForward,
    #[serde(rename = "refresh")]
    Refresh,
    #[serde(rename = "dragDrop")]
    DragDrop,
    #[serde(rename = "uploadFile")]
    UploadFile,
    #[serde(rename = "switchTab")]
    SwitchTab,
    #[serde(rename = "executeJS")]
    ExecuteJs,
    #[serde(rename = "getElements")]
    GetElements,
    #[serde(rename = "getElementDetails")]
    GetElementDetails,
}

impl ActionKind {
    /// All members of the closed set, in prompt-listing order.
    pub const ALL: &'static [ActionKind] = &[
        ActionKind::Click,
        ActionKind::Type,
        ActionKind::Scroll,
        ActionKind::Navigate,
        ActionKind::Screenshot,
        ActionKind::Wait,
        ActionKind::Hover,
        ActionKind::Select,
        ActionKind::PressKey,
        ActionKind::GoBack,
        ActionKind::GoForward,
        ActionKind::Refresh,
        ActionKind::DragDrop,
        ActionKind::UploadFile,
        ActionKind::SwitchTab,
        ActionKind::ExecuteJs,
        ActionKind::GetElements,
        ActionKind::GetElementDetails,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Click => "click",
            ActionKind::Type => "type",
            ActionKind::Scroll => "scroll",
            ActionKind::Navigate => "navigate",
            ActionKind::Screenshot => "screenshot",
            ActionKind::Wait => "wait",
            ActionKind::Hover => "hover",
            ActionKind::Select => "select",
            ActionKind::PressKey => "pressKey",
            ActionKind::GoBack => "goBack",
            ActionKind::GoForward => "goForward",
            ActionKind::Refresh => "refresh",
            ActionKind::DragDrop => "dragDrop",
            ActionKind::UploadFile => "uploadFile",
            ActionKind::SwitchTab => "switchTab",
            ActionKind::ExecuteJs => "executeJS",
            ActionKind::GetElements => "getElements",
            ActionKind::GetElementDetails => "getElementDetails",
        }
    }

    /// Resolve a wire name to a member of the closed set.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == name.trim())
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single action proposed by the model. Created per decision and never
/// reused across turns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrowserAction {
    #[serde(rename = "action")]
    pub kind: ActionKind,
    #[serde(default, flatten)]
    pub params: JsonMap<String, Value>,
}

impl BrowserAction {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            params: JsonMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }

    /// Integer parameter, accepting both JSON numbers and numeric strings
    /// since models are inconsistent about quoting.
    pub fn param_i64(&self, key: &str) -> Option<i64> {
        match self.params.get(key) {
            Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|v| v.round() as i64)),
            Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    }

    pub fn param_u64(&self, key: &str) -> Option<u64> {
        self.param_i64(key).and_then(|v| u64::try_from(v).ok())
    }

    pub fn param_bool(&self, key: &str) -> Option<bool> {
        self.params.get(key).and_then(Value::as_bool)
    }
}

/// Outcome of one dispatched action. Always fully populated; dispatch
/// failures are carried here rather than raised.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl ActionResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            payload: None,
        }
    }

    pub fn ok_with(message: impl Into<String>, payload: Value) -> Self {
        Self {
            success: true,
            message: message.into(),
            payload: Some(payload),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            payload: None,
        }
    }
}
