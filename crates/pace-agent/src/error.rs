use thiserror::Error;

/// Failures on the agent side of a session. Session-level errors reported by
/// the agent itself travel as [`AgentEvent::Error`](crate::AgentEvent::Error)
/// instead.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// A stdout line that is not a stream-json message.
    #[error("unparseable agent output ({source}): {line}")]
    Parse {
        line: String,
        #[source]
        source: serde_json::Error,
    },

    /// Spawning, feeding or reaping the agent process failed.
    #[error("agent process: {0}")]
    Process(String),

    #[error("event subscriber fell behind; {0} event(s) dropped")]
    Lagged(u64),
}
