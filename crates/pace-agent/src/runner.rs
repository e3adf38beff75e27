use std::path::PathBuf;

use async_trait::async_trait;

use crate::event::{AgentEvent, SessionError, TextPart, ToolPart};
use crate::process::{ClaudeOptions, ClaudeProcess};
use crate::stream::{EventBus, EventStream};
use crate::types::{ContentBlock, Message};
use crate::Result;

// ─── SessionRequest ───────────────────────────────────────────────────────

/// One unit of work for an agent: implement `feature_id` in `project_dir`.
#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub prompt: String,
    pub feature_id: String,
    pub project_dir: PathBuf,
}

// ─── AgentRunner ──────────────────────────────────────────────────────────

/// The boundary between the orchestrator and whatever executes a session.
///
/// Events for every session flow through one shared stream. Callers must
/// [`subscribe`](AgentRunner::subscribe) before
/// [`send_prompt`](AgentRunner::send_prompt); events published earlier are
/// not replayed.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    fn subscribe(&self) -> EventStream;

    /// Allocate a session and return its id.
    async fn create_session(&self, request: &SessionRequest) -> Result<String>;

    /// Start work on `session_id`. Returns once the prompt is delivered;
    /// progress and the outcome arrive as events.
    async fn send_prompt(&self, session_id: &str, request: &SessionRequest) -> Result<()>;
}

// ─── ClaudeRunner ─────────────────────────────────────────────────────────

/// Runs each session as a `claude` subprocess and republishes its
/// stream-json output as [`AgentEvent`]s.
pub struct ClaudeRunner {
    opts: ClaudeOptions,
    bus: EventBus,
}

impl ClaudeRunner {
    pub fn new(opts: ClaudeOptions) -> Self {
        Self {
            opts,
            bus: EventBus::default(),
        }
    }
}

#[async_trait]
impl AgentRunner for ClaudeRunner {
    fn subscribe(&self) -> EventStream {
        self.bus.subscribe()
    }

    async fn create_session(&self, request: &SessionRequest) -> Result<String> {
        let session_id = uuid::Uuid::new_v4().to_string();
        tracing::debug!(session_id = %session_id, feature_id = %request.feature_id, "session allocated");
        Ok(session_id)
    }

    async fn send_prompt(&self, session_id: &str, request: &SessionRequest) -> Result<()> {
        let process =
            ClaudeProcess::spawn(&request.prompt, session_id, &request.project_dir, &self.opts)
                .await?;
        let bus = self.bus.clone();
        let session_id = session_id.to_string();
        tokio::spawn(async move { pump(process, session_id, bus).await });
        Ok(())
    }
}

// ─── Translation ──────────────────────────────────────────────────────────

/// Forward one process's output onto the bus until its result message, EOF,
/// or a read error. Always ends with exactly one terminal event.
async fn pump(mut process: ClaudeProcess, session_id: String, bus: EventBus) {
    let mut translator = Translator::new(&session_id);
    let mut finished = false;

    loop {
        match process.next_message().await {
            Ok(Some(msg)) => {
                for event in translator.translate(&msg) {
                    finished |= event.is_terminal();
                    bus.publish(event);
                }
                if finished {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "agent output unreadable");
                bus.publish(AgentEvent::Error(SessionError::new(Some(&session_id), e.to_string())));
                finished = true;
                break;
            }
        }
    }

    if !finished {
        let message = match process.wait_exit_error().await {
            Some(e) => e.to_string(),
            None => "agent exited without reporting a result".to_string(),
        };
        bus.publish(AgentEvent::Error(translator.error(message)));
    }
    process.kill().await;
}

/// Stateful mapping from wire [`Message`]s to [`AgentEvent`]s for one
/// session. Events are stamped with the id the runner allocated.
pub(crate) struct Translator {
    session_id: String,
    /// Last API error code seen on an assistant message.
    last_error_code: Option<String>,
}

impl Translator {
    pub(crate) fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            last_error_code: None,
        }
    }

    fn error(&self, message: String) -> SessionError {
        SessionError {
            session_id: Some(self.session_id.clone()),
            message,
            status: None,
            code: self.last_error_code.clone(),
        }
    }

    pub(crate) fn translate(&mut self, msg: &Message) -> Vec<AgentEvent> {
        if msg.session_id() != self.session_id {
            tracing::debug!(
                expected = %self.session_id,
                got = %msg.session_id(),
                "agent reported a different session id"
            );
        }
        let sid = self.session_id.clone();

        match msg {
            Message::System(sys) if sys.is_init() => vec![AgentEvent::SessionCreated {
                session_id: sid,
                model: sys.model.clone(),
            }],
            Message::Assistant(a) => {
                if let Some(code) = &a.error {
                    self.last_error_code = Some(code.clone());
                }
                a.message
                    .content
                    .iter()
                    .filter_map(|block| match block {
                        ContentBlock::Text { text } => Some(AgentEvent::TextUpdate {
                            part: TextPart {
                                session_id: sid.clone(),
                                text: text.clone(),
                            },
                        }),
                        ContentBlock::ToolUse { id, name, .. } => Some(AgentEvent::ToolUpdate {
                            part: ToolPart {
                                session_id: sid.clone(),
                                call_id: id.clone(),
                                tool: name.clone(),
                            },
                        }),
                        _ => None,
                    })
                    .collect()
            }
            Message::Result(r) if r.is_success() => vec![AgentEvent::Idle { session_id: sid }],
            Message::Result(r) => vec![AgentEvent::Error(self.error(r.error_message()))],
            Message::System(_) | Message::User(_) | Message::ToolProgress(_) => Vec::new(),
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{future, StreamExt};
    use std::io::Write;
    use tempfile::NamedTempFile;
    use tokio::process::Command;

    fn parse(json: &str) -> Message {
        serde_json::from_str(json).unwrap()
    }

    const INIT: &str = r#"{"type":"system","subtype":"init","session_id":"s1","model":"sonnet","cwd":"/tmp","tools":[]}"#;
    const ASSISTANT: &str = r#"{"type":"assistant","session_id":"s1","parent_tool_use_id":null,"message":{"id":"m","role":"assistant","model":"x","content":[{"type":"text","text":"Reading"},{"type":"tool_use","id":"tu_1","name":"Read","input":{}},{"type":"thinking","thinking":"hmm"}],"usage":{"input_tokens":1,"output_tokens":1}}}"#;
    const SUCCESS: &str = r#"{"type":"result","subtype":"success","session_id":"s1","result":"done","is_error":false,"num_turns":2,"duration_ms":5,"total_cost_usd":0.01,"usage":{"input_tokens":1,"output_tokens":1}}"#;
    const MAX_TURNS: &str = r#"{"type":"result","subtype":"error_max_turns","session_id":"s1","is_error":true,"num_turns":10,"errors":["Reached maximum turn limit"]}"#;

    #[test]
    fn init_becomes_session_created() {
        let mut t = Translator::new("s1");
        let events = t.translate(&parse(INIT));
        assert_eq!(
            events,
            vec![AgentEvent::SessionCreated {
                session_id: "s1".into(),
                model: Some("sonnet".into()),
            }]
        );
    }

    #[test]
    fn assistant_blocks_become_progress_events() {
        let mut t = Translator::new("s1");
        let events = t.translate(&parse(ASSISTANT));
        let kinds: Vec<&str> = events.iter().map(AgentEvent::kind).collect();
        assert_eq!(kinds, vec!["text_update", "tool_update"]);
        assert!(events.iter().all(|e| !e.is_terminal()));
    }

    #[test]
    fn results_map_to_terminal_events() {
        let mut t = Translator::new("s1");
        assert_eq!(
            t.translate(&parse(SUCCESS)),
            vec![AgentEvent::Idle { session_id: "s1".into() }]
        );
        let failed = t.translate(&parse(MAX_TURNS));
        let [AgentEvent::Error(e)] = failed.as_slice() else {
            panic!("expected one error, got {failed:?}");
        };
        assert_eq!(e.message, "Reached maximum turn limit");
    }

    #[test]
    fn assistant_api_error_code_is_attached_to_failure() {
        let mut t = Translator::new("s1");
        t.translate(&parse(
            r#"{"type":"assistant","session_id":"s1","error":"rate_limit","message":{"content":[{"type":"text","text":"API Error: 429"}]}}"#,
        ));
        let events = t.translate(&parse(
            r#"{"type":"result","subtype":"success","session_id":"s1","is_error":true,"result":"API Error: 429"}"#,
        ));
        let [AgentEvent::Error(e)] = events.as_slice() else {
            panic!("expected error");
        };
        assert_eq!(e.code.as_deref(), Some("rate_limit"));
        assert!(e.rate_limit().is_some());
    }

    #[test]
    fn events_are_stamped_with_requested_session() {
        let mut t = Translator::new("mine");
        let events = t.translate(&parse(SUCCESS));
        assert_eq!(events[0].session_id(), Some("mine"));
    }

    fn mock_process(lines: &[&str]) -> (ClaudeProcess, NamedTempFile) {
        let mut f = NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(f, "{line}").unwrap();
        }
        let mut cmd = Command::new("cat");
        cmd.arg(f.path());
        (ClaudeProcess::spawn_command(cmd).unwrap(), f)
    }

    #[tokio::test]
    async fn pump_publishes_until_result() {
        let bus = EventBus::default();
        let stream = bus.subscribe();
        let (process, _file) = mock_process(&[INIT, ASSISTANT, SUCCESS, INIT]);

        pump(process, "s1".into(), bus.clone()).await;
        drop(bus);

        let events: Vec<AgentEvent> = stream.filter_map(|e| future::ready(e.ok())).collect().await;
        let kinds: Vec<&str> = events.iter().map(AgentEvent::kind).collect();
        assert_eq!(kinds, vec!["session_created", "text_update", "tool_update", "idle"]);
    }

    #[tokio::test]
    async fn pump_reports_eof_without_result_as_error() {
        let bus = EventBus::default();
        let stream = bus.subscribe();
        let (process, _file) = mock_process(&[INIT]);

        pump(process, "s1".into(), bus.clone()).await;
        drop(bus);

        let events: Vec<AgentEvent> = stream.filter_map(|e| future::ready(e.ok())).collect().await;
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], AgentEvent::Error(_)));
    }

    #[tokio::test]
    async fn pump_reports_garbage_output_as_error() {
        let bus = EventBus::default();
        let stream = bus.subscribe();
        let (process, _file) = mock_process(&["this is not json"]);

        pump(process, "s1".into(), bus.clone()).await;
        drop(bus);

        let events: Vec<AgentEvent> = stream.filter_map(|e| future::ready(e.ok())).collect().await;
        let [AgentEvent::Error(e)] = events.as_slice() else {
            panic!("expected one error, got {events:?}");
        };
        assert!(e.message.contains("parse"));
    }

    #[tokio::test]
    async fn send_prompt_fails_for_missing_binary() {
        let runner = ClaudeRunner::new(ClaudeOptions {
            command: "definitely-not-a-real-agent-binary".into(),
            ..Default::default()
        });
        let dir = tempfile::TempDir::new().unwrap();
        let req = SessionRequest {
            prompt: "p".into(),
            feature_id: "F1".into(),
            project_dir: dir.path().to_path_buf(),
        };
        let sid = runner.create_session(&req).await.unwrap();
        assert_eq!(sid.len(), 36);
        assert!(runner.send_prompt(&sid, &req).await.is_err());
    }
}
