use serde::{Deserialize, Serialize};

use crate::rate_limit::RateLimitInfo;

/// Events published by an [`AgentRunner`](crate::AgentRunner).
///
/// Session-scoped kinds carry the session id at the top level; message-scoped
/// kinds (`tool_update`, `text_update`) nest it under `part`. Use
/// [`AgentEvent::session_id`] instead of reaching into the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    SessionCreated {
        session_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
    },
    ToolUpdate {
        part: ToolPart,
    },
    TextUpdate {
        part: TextPart,
    },
    /// The session finished its turn normally.
    Idle {
        session_id: String,
    },
    Error(SessionError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolPart {
    pub session_id: String,
    pub call_id: String,
    pub tool: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextPart {
    pub session_id: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionError {
    /// Absent when the failure happened before a session existed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl SessionError {
    pub fn new(session_id: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            session_id: session_id.map(str::to_string),
            message: message.into(),
            status: None,
            code: None,
        }
    }

    pub fn rate_limit(&self) -> Option<RateLimitInfo> {
        RateLimitInfo::detect(self.status, &self.message, self.code.as_deref())
    }
}

/// How a terminal event ended the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    Success,
    Failure,
}

impl AgentEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            AgentEvent::SessionCreated { .. } => "session_created",
            AgentEvent::ToolUpdate { .. } => "tool_update",
            AgentEvent::TextUpdate { .. } => "text_update",
            AgentEvent::Idle { .. } => "idle",
            AgentEvent::Error(_) => "error",
        }
    }

    /// Where the correlation id lives depends on the kind.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            AgentEvent::SessionCreated { session_id, .. } | AgentEvent::Idle { session_id } => {
                Some(session_id)
            }
            AgentEvent::ToolUpdate { part } => Some(&part.session_id),
            AgentEvent::TextUpdate { part } => Some(&part.session_id),
            AgentEvent::Error(e) => e.session_id.as_deref(),
        }
    }

    /// Whether this event concerns `session_id`. Errors without an id are
    /// attributed to whichever session is waiting.
    pub fn belongs_to(&self, session_id: &str) -> bool {
        match self.session_id() {
            Some(id) => id == session_id,
            None => matches!(self, AgentEvent::Error(_)),
        }
    }

    pub fn terminal(&self) -> Option<Terminal> {
        match self {
            AgentEvent::Idle { .. } => Some(Terminal::Success),
            AgentEvent::Error(_) => Some(Terminal::Failure),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correlation_id_is_found_per_kind() {
        let created = AgentEvent::SessionCreated {
            session_id: "s1".into(),
            model: None,
        };
        let tool = AgentEvent::ToolUpdate {
            part: ToolPart {
                session_id: "s1".into(),
                call_id: "c1".into(),
                tool: "Edit".into(),
            },
        };
        let text = AgentEvent::TextUpdate {
            part: TextPart {
                session_id: "s2".into(),
                text: "hi".into(),
            },
        };
        assert_eq!(created.session_id(), Some("s1"));
        assert_eq!(tool.session_id(), Some("s1"));
        assert_eq!(text.session_id(), Some("s2"));
        assert!(tool.belongs_to("s1"));
        assert!(!text.belongs_to("s1"));
    }

    #[test]
    fn uncorrelated_errors_belong_to_any_session() {
        let err = AgentEvent::Error(SessionError::new(None, "boom"));
        assert!(err.belongs_to("anything"));
        let scoped = AgentEvent::Error(SessionError::new(Some("s9"), "boom"));
        assert!(!scoped.belongs_to("s1"));
    }

    #[test]
    fn only_idle_and_error_are_terminal() {
        assert_eq!(
            AgentEvent::Idle { session_id: "s".into() }.terminal(),
            Some(Terminal::Success)
        );
        assert_eq!(
            AgentEvent::Error(SessionError::new(Some("s"), "x")).terminal(),
            Some(Terminal::Failure)
        );
        let text = AgentEvent::TextUpdate {
            part: TextPart {
                session_id: "s".into(),
                text: "done!".into(),
            },
        };
        assert!(!text.is_terminal());
    }

    #[test]
    fn wire_shape_nests_part_ids() {
        let json = r#"{"type":"tool_update","part":{"session_id":"s1","call_id":"c","tool":"Bash"}}"#;
        let ev: AgentEvent = serde_json::from_str(json).unwrap();
        assert_eq!(ev.kind(), "tool_update");
        assert_eq!(ev.session_id(), Some("s1"));

        let json = r#"{"type":"error","message":"overloaded","status":529}"#;
        let ev: AgentEvent = serde_json::from_str(json).unwrap();
        assert_eq!(ev.session_id(), None);
        assert!(ev.is_terminal());
    }
}
