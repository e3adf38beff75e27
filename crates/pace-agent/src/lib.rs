//! `pace-agent`: the agent side of a pace session.
//!
//! The orchestrator talks to an [`AgentRunner`]: it subscribes to the
//! runner's [`EventStream`], creates a session, sends the prompt, then waits
//! for a terminal [`AgentEvent`] (`idle` or `error`) for that session.
//!
//! ```text
//! AgentRunner::subscribe() ──► EventStream (broadcast subscription)
//!        │
//! create_session() ─► send_prompt()
//!        │
//!        ▼
//! ClaudeProcess     ← `claude --output-format stream-json …`, JSONL on stdout
//!        │
//!        ▼
//! Translator        ← wire Message → AgentEvent, published on the EventBus
//! ```
//!
//! [`ClaudeRunner`] is the production runner. Tests and alternative backends
//! implement [`AgentRunner`] directly and publish on their own [`EventBus`].

pub mod error;
pub mod event;
pub mod rate_limit;
pub mod runner;
pub mod stream;
pub mod types;

pub(crate) mod process;


pub use error::AgentError;
pub use event::{AgentEvent, SessionError, Terminal, TextPart, ToolPart};
pub use process::ClaudeOptions;
pub use rate_limit::RateLimitInfo;
pub use runner::{AgentRunner, ClaudeRunner, SessionRequest};
pub use stream::{EventBus, EventStream};

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, AgentError>;
