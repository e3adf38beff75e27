use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use crate::types::Message;
use crate::{AgentError, Result};

// ─── Launch options ───────────────────────────────────────────────────────

/// Flags for one `claude` invocation.
#[derive(Debug, Clone)]
pub struct ClaudeOptions {
    /// Executable name or path (default `claude`).
    pub command: String,
    pub model: Option<String>,
    pub max_turns: Option<u32>,
    pub permission_mode: Option<String>,
    pub allowed_tools: Vec<String>,
    pub env: HashMap<String, String>,
}

impl Default for ClaudeOptions {
    fn default() -> Self {
        Self {
            command: "claude".to_string(),
            model: None,
            max_turns: None,
            permission_mode: None,
            allowed_tools: Vec::new(),
            env: HashMap::new(),
        }
    }
}

// ─── ClaudeProcess ────────────────────────────────────────────────────────

/// A running `claude --output-format stream-json --input-format stream-json`
/// subprocess.
///
/// The prompt goes in as one JSON user message on stdin, then stdin is
/// closed. Responses are read as JSONL from stdout. Stderr is drained in the
/// background and attached to the exit error.
pub(crate) struct ClaudeProcess {
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
    stdin: Option<ChildStdin>,
    stderr_buf: Arc<Mutex<String>>,
}

impl ClaudeProcess {
    /// `CLAUDECODE` is removed from the environment so a nested run isn't
    /// refused when pace itself is launched from inside an agent session.
    pub(crate) async fn spawn(
        prompt: &str,
        session_id: &str,
        cwd: &Path,
        opts: &ClaudeOptions,
    ) -> Result<Self> {
        let mut cmd = build_command(session_id, cwd, opts);
        cmd.env_remove("CLAUDECODE");
        for (k, v) in &opts.env {
            cmd.env(k, v);
        }

        let mut process = Self::from_command(cmd)?;
        let user_msg = serde_json::json!({
            "type": "user",
            "message": {
                "role": "user",
                "content": [{"type": "text", "text": prompt}]
            }
        });
        process.send_message(&user_msg).await?;
        process.close_stdin();
        Ok(process)
    }

    /// Run an arbitrary command in place of `claude`.
    #[cfg(test)]
    pub(crate) fn spawn_command(cmd: Command) -> Result<Self> {
        Self::from_command(cmd)
    }

    fn from_command(mut cmd: Command) -> Result<Self> {
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(AgentError::Io)?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AgentError::Process("stdout not captured".into()))?;
        let stdin = child.stdin.take();

        let stderr_buf = Arc::new(Mutex::new(String::new()));
        if let Some(stderr) = child.stderr.take() {
            let buf = Arc::clone(&stderr_buf);
            tokio::spawn(async move {
                let mut reader = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = reader.next_line().await {
                    if let Ok(mut b) = buf.lock() {
                        if !b.is_empty() {
                            b.push('\n');
                        }
                        b.push_str(&line);
                    }
                }
            });
        }

        Ok(Self {
            child,
            lines: BufReader::new(stdout).lines(),
            stdin,
            stderr_buf,
        })
    }

    async fn send_message(&mut self, msg: &serde_json::Value) -> Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| AgentError::Process("stdin already closed".into()))?;

        let mut buf = serde_json::to_vec(msg)
            .map_err(|e| AgentError::Process(format!("failed to serialize stdin message: {e}")))?;
        buf.push(b'\n');

        stdin.write_all(&buf).await?;
        stdin.flush().await?;
        Ok(())
    }

    fn close_stdin(&mut self) {
        self.stdin.take();
    }

    /// Next non-empty JSONL line from stdout, deserialized. Valid JSON with an
    /// unrecognised `type` is skipped. `Ok(None)` on EOF.
    pub(crate) async fn next_message(&mut self) -> Result<Option<Message>> {
        loop {
            let Some(line) = self.lines.next_line().await? else {
                return Ok(None);
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<Message>(trimmed) {
                Ok(msg) => return Ok(Some(msg)),
                Err(_) if is_unknown_message_type(trimmed) => continue,
                Err(source) => {
                    return Err(AgentError::Parse {
                        line: trimmed.to_owned(),
                        source,
                    })
                }
            }
        }
    }

    /// Wait for exit. `Some(error)` for a non-zero exit or signal, with any
    /// captured stderr appended.
    pub(crate) async fn wait_exit_error(&mut self) -> Option<AgentError> {
        let status = match self.child.wait().await {
            Ok(s) => s,
            Err(e) => return Some(AgentError::Io(e)),
        };
        if status.success() {
            return None;
        }

        let stderr = self
            .stderr_buf
            .lock()
            .ok()
            .map(|b| b.clone())
            .unwrap_or_default();
        let head = match status.code() {
            Some(code) => format!("agent process exited with code {code}"),
            None => "agent process terminated by signal".to_string(),
        };
        let msg = if stderr.is_empty() {
            head
        } else {
            format!("{head}\nstderr: {stderr}")
        };
        Some(AgentError::Process(msg))
    }

    pub(crate) async fn kill(&mut self) {
        let _ = self.child.kill().await;
    }
}

/// Valid JSON carrying a `type` we don't model (`stream_event`,
/// `auth_status`, ...) is not a parse error.
fn is_unknown_message_type(line: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(line)
        .map(|v| v.get("type").is_some())
        .unwrap_or(false)
}

// ─── Command builder ──────────────────────────────────────────────────────

pub(crate) fn build_command(session_id: &str, cwd: &Path, opts: &ClaudeOptions) -> Command {
    let mut cmd = Command::new(&opts.command);

    cmd.arg("--output-format")
        .arg("stream-json")
        .arg("--verbose")
        .arg("--input-format")
        .arg("stream-json")
        .arg("--session-id")
        .arg(session_id);

    if let Some(model) = &opts.model {
        cmd.arg("--model").arg(model);
    }
    if let Some(max_turns) = opts.max_turns {
        cmd.arg("--max-turns").arg(max_turns.to_string());
    }
    if let Some(mode) = &opts.permission_mode {
        cmd.arg("--permission-mode").arg(mode);
    }
    if !opts.allowed_tools.is_empty() {
        cmd.arg("--allowed-tools").args(&opts.allowed_tools);
    }

    cmd.current_dir(cwd);
    cmd
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;

    #[test]
    fn command_carries_session_and_options() {
        let opts = ClaudeOptions {
            model: Some("sonnet".into()),
            max_turns: Some(40),
            permission_mode: Some("acceptEdits".into()),
            allowed_tools: vec!["Read".into(), "Edit".into()],
            ..Default::default()
        };
        let cmd = build_command("sid-1", Path::new("/tmp"), &opts);
        let std_cmd = cmd.as_std();
        let args: Vec<&OsStr> = std_cmd.get_args().collect();
        let args: Vec<&str> = args.iter().filter_map(|a| a.to_str()).collect();

        assert_eq!(std_cmd.get_program(), "claude");
        assert_eq!(std_cmd.get_current_dir(), Some(Path::new("/tmp")));
        for pair in [
            ["--session-id", "sid-1"],
            ["--model", "sonnet"],
            ["--max-turns", "40"],
            ["--permission-mode", "acceptEdits"],
            ["--output-format", "stream-json"],
        ] {
            assert!(args.windows(2).any(|w| w == pair), "missing {pair:?} in {args:?}");
        }
        assert!(args.ends_with(&["--allowed-tools", "Read", "Edit"]));
    }

    #[test]
    fn defaults_add_no_optional_flags() {
        let cmd = build_command("s", Path::new("."), &ClaudeOptions::default());
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert!(!args.iter().any(|a| a == "--model" || a == "--max-turns"));
    }

    #[test]
    fn unknown_type_detection() {
        assert!(is_unknown_message_type(r#"{"type":"rate_limit_event"}"#));
        assert!(!is_unknown_message_type(r#"{"no_type":1}"#));
        assert!(!is_unknown_message_type("not json"));
    }
}
