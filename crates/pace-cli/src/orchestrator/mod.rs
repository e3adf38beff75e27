//! The session loop: select the next failing feature, hand it to an
//! [`AgentRunner`](pace_agent::AgentRunner), wait for the session's terminal
//! event, re-read the feature store and decide whether to continue.
//!
//! ```text
//! INIT ─► SELECT_FEATURE ─► RUN_SESSION ─► EVALUATE ─┐
//!   │          ▲   │                                  │
//!   │          └───┼──────────── delay ◄──────────────┘
//!   ▼              ▼
//! STOPPED ◄── stop condition / nothing left
//! ```

mod engine;
mod evaluate;
mod options;
mod state;

pub use engine::{DryRunPreview, Orchestrator};
pub use evaluate::{await_terminal, is_success, Observation, RunnerSignal};
pub use options::RunOptions;
pub use state::{OrchestratorState, RunSummary, SessionMetrics, StopReason};
