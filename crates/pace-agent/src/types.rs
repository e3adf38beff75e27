use serde::{Deserialize, Serialize};

// ─── Wire messages ────────────────────────────────────────────────────────

/// The subset of `claude --output-format stream-json` messages the runner
/// translates into [`AgentEvent`](crate::AgentEvent)s. Discriminated by the
/// JSON `"type"` field; types not listed here are skipped by the reader.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    System(SystemMessage),
    Assistant(AssistantMessage),
    User(UserMessage),
    Result(ResultMessage),
    ToolProgress(ToolProgressMessage),
}

impl Message {
    pub fn session_id(&self) -> &str {
        match self {
            Message::System(m) => &m.session_id,
            Message::Assistant(m) => &m.session_id,
            Message::User(m) => &m.session_id,
            Message::Result(m) => &m.session_id,
            Message::ToolProgress(m) => &m.session_id,
        }
    }
}

/// `type = "system"`. Only `subtype = "init"` matters here.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SystemMessage {
    pub subtype: String,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
}

impl SystemMessage {
    pub fn is_init(&self) -> bool {
        self.subtype == "init"
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssistantMessage {
    pub message: AssistantContent,
    pub session_id: String,
    /// Set by the CLI when the API call behind this message failed
    /// (`rate_limit`, `authentication_failed`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssistantContent {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    Thinking {
        thinking: String,
    },
    #[serde(other)]
    Other,
}

/// `type = "user"`: tool results fed back to the model. Only the session id
/// is read.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UserMessage {
    pub session_id: String,
}

/// `type = "result"`: the terminal message of every run. `subtype` is
/// `success` or one of the `error_*` kinds.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResultMessage {
    pub subtype: String,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default)]
    pub num_turns: u32,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub total_cost_usd: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl ResultMessage {
    pub fn is_success(&self) -> bool {
        self.subtype == "success" && !self.is_error
    }

    /// Human-readable failure description for error subtypes.
    pub fn error_message(&self) -> String {
        if !self.errors.is_empty() {
            return self.errors.join("; ");
        }
        if let Some(text) = self.result.as_deref().filter(|t| !t.is_empty()) {
            return text.to_string();
        }
        format!("agent run ended with {}", self.subtype)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolProgressMessage {
    pub tool_use_id: String,
    pub tool_name: String,
    pub session_id: String,
    #[serde(default)]
    pub elapsed_time_seconds: f64,
}
