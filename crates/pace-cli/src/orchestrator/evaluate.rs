use futures::{Stream, StreamExt};
use pace_agent::AgentEvent;
use serde::Serialize;

/// How the wait for a session ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunnerSignal {
    /// The runner reported the session finished normally.
    Idle,
    /// The runner reported a session error.
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        retry_after_secs: Option<u64>,
    },
    /// Creating the session or sending the prompt failed.
    DispatchFailed { message: String },
    /// The event stream yielded an error.
    StreamFailed { message: String },
    /// The event stream closed before a terminal event.
    StreamEnded,
}

impl RunnerSignal {
    pub fn is_idle(&self) -> bool {
        matches!(self, RunnerSignal::Idle)
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            RunnerSignal::Error { message, .. }
            | RunnerSignal::DispatchFailed { message }
            | RunnerSignal::StreamFailed { message } => Some(message),
            RunnerSignal::StreamEnded => Some("event stream closed before the session finished"),
            RunnerSignal::Idle => None,
        }
    }
}

/// The terminal signal plus liveness counters gathered while waiting.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub signal: RunnerSignal,
    pub tool_calls: u32,
    pub text_parts: u32,
}

impl Observation {
    pub fn dispatch_failed(message: impl Into<String>) -> Self {
        Self {
            signal: RunnerSignal::DispatchFailed {
                message: message.into(),
            },
            tool_calls: 0,
            text_parts: 0,
        }
    }
}

/// Consume `events` until a terminal event for `session_id` arrives, or the
/// stream fails or ends. Events for other sessions are skipped; progress
/// events only bump counters.
pub async fn await_terminal<S>(events: &mut S, session_id: &str) -> Observation
where
    S: Stream<Item = pace_agent::Result<AgentEvent>> + Unpin,
{
    let mut tool_calls = 0;
    let mut text_parts = 0;

    let signal = loop {
        let event = match events.next().await {
            None => break RunnerSignal::StreamEnded,
            Some(Err(e)) => {
                break RunnerSignal::StreamFailed {
                    message: e.to_string(),
                }
            }
            Some(Ok(event)) => event,
        };
        if !event.belongs_to(session_id) {
            tracing::trace!(kind = event.kind(), "event for another session");
            continue;
        }
        match event {
            AgentEvent::SessionCreated { model, .. } => {
                tracing::debug!(session_id, model = model.as_deref().unwrap_or("default"), "session started");
            }
            AgentEvent::ToolUpdate { part } => {
                tool_calls += 1;
                tracing::debug!(session_id, tool = %part.tool, "tool call");
            }
            AgentEvent::TextUpdate { .. } => text_parts += 1,
            AgentEvent::Idle { .. } => break RunnerSignal::Idle,
            AgentEvent::Error(err) => {
                let retry_after_secs = err.rate_limit().map(|info| {
                    tracing::warn!(session_id, "{}", info.suggestion());
                    info.retry_after.as_secs()
                });
                break RunnerSignal::Error {
                    message: err.message,
                    retry_after_secs,
                };
            }
        }
    };

    Observation {
        signal,
        tool_calls,
        text_parts,
    }
}

/// A session counts only if the runner went idle and at least one more
/// feature passes than before.
pub fn is_success(signal: &RunnerSignal, delta: i64) -> bool {
    signal.is_idle() && delta > 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use pace_agent::{AgentError, SessionError, TextPart, ToolPart};

    fn tool(sid: &str) -> AgentEvent {
        AgentEvent::ToolUpdate {
            part: ToolPart {
                session_id: sid.into(),
                call_id: "c".into(),
                tool: "Edit".into(),
            },
        }
    }

    fn text(sid: &str) -> AgentEvent {
        AgentEvent::TextUpdate {
            part: TextPart {
                session_id: sid.into(),
                text: "working".into(),
            },
        }
    }

    fn idle(sid: &str) -> AgentEvent {
        AgentEvent::Idle {
            session_id: sid.into(),
        }
    }

    #[tokio::test]
    async fn idle_ends_wait_and_counts_progress() {
        let mut events = stream::iter(vec![
            Ok(tool("s1")),
            Ok(text("s1")),
            Ok(tool("s1")),
            Ok(idle("s1")),
            Ok(tool("s1")),
        ]);
        let obs = await_terminal(&mut events, "s1").await;
        assert_eq!(obs.signal, RunnerSignal::Idle);
        assert_eq!(obs.tool_calls, 2);
        assert_eq!(obs.text_parts, 1);
    }

    #[tokio::test]
    async fn other_sessions_are_ignored() {
        let mut events = stream::iter(vec![
            Ok(idle("other")),
            Ok(tool("other")),
            Ok(AgentEvent::Error(SessionError::new(Some("s1"), "boom"))),
        ]);
        let obs = await_terminal(&mut events, "s1").await;
        assert_eq!(obs.tool_calls, 0);
        assert!(matches!(obs.signal, RunnerSignal::Error { ref message, .. } if message == "boom"));
    }

    #[tokio::test]
    async fn unattributed_error_fails_the_waiting_session() {
        let mut events = stream::iter(vec![Ok(AgentEvent::Error(SessionError::new(
            None,
            "connection reset",
        )))]);
        let obs = await_terminal(&mut events, "s1").await;
        assert!(matches!(obs.signal, RunnerSignal::Error { .. }));
    }

    #[tokio::test]
    async fn rate_limit_error_carries_suggested_wait() {
        let mut err = SessionError::new(Some("s1"), "429 Too Many Requests, retry after 30");
        err.status = Some(429);
        let mut events = stream::iter(vec![Ok(AgentEvent::Error(err))]);
        let obs = await_terminal(&mut events, "s1").await;
        assert!(matches!(
            obs.signal,
            RunnerSignal::Error {
                retry_after_secs: Some(30),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn stream_end_and_stream_error_are_failures() {
        let mut ended = stream::iter(vec![Ok(tool("s1"))]);
        let obs = await_terminal(&mut ended, "s1").await;
        assert_eq!(obs.signal, RunnerSignal::StreamEnded);
        assert_eq!(obs.tool_calls, 1);

        let mut broken = stream::iter(vec![Ok(text("s1")), Err(AgentError::Lagged(4))]);
        let obs = await_terminal(&mut broken, "s1").await;
        assert!(matches!(obs.signal, RunnerSignal::StreamFailed { .. }));
    }

    #[test]
    fn success_needs_idle_and_progress() {
        assert!(is_success(&RunnerSignal::Idle, 1));
        assert!(!is_success(&RunnerSignal::Idle, 0));
        assert!(!is_success(&RunnerSignal::Idle, -1));
        assert!(!is_success(&RunnerSignal::StreamEnded, 3));
    }
}
