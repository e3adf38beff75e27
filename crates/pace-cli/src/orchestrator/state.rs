use std::time::Instant;

use chrono::{DateTime, Utc};
use pace_core::feature::Progress;
use serde::Serialize;

use super::engine::DryRunPreview;
use super::evaluate::RunnerSignal;
use super::options::RunOptions;

// ---------------------------------------------------------------------------
// StopReason
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Every feature passes, or the backlog is empty.
    Complete,
    MaxSessions,
    CircuitBreaker,
    /// A prompt was built but nothing was dispatched.
    DryRun,
}

impl StopReason {
    /// Whether the run ended in a state the caller should treat as success.
    pub fn is_success(self) -> bool {
        matches!(self, StopReason::Complete | StopReason::DryRun)
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StopReason::Complete => "complete",
            StopReason::MaxSessions => "max sessions reached",
            StopReason::CircuitBreaker => "circuit breaker tripped",
            StopReason::DryRun => "dry run",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// OrchestratorState
// ---------------------------------------------------------------------------

/// Counters for one run. Lives as long as the [`Orchestrator`](super::Orchestrator)
/// that owns it.
#[derive(Debug, Clone)]
pub struct OrchestratorState {
    pub session_count: u32,
    pub consecutive_failures: u32,
    pub features_completed: u32,
    pub started_at: DateTime<Utc>,
    start_time: Instant,
}

impl Default for OrchestratorState {
    fn default() -> Self {
        Self::new()
    }
}

impl OrchestratorState {
    pub fn new() -> Self {
        Self {
            session_count: 0,
            consecutive_failures: 0,
            features_completed: 0,
            started_at: Utc::now(),
            start_time: Instant::now(),
        }
    }

    /// Stop conditions in priority order: session cap, circuit breaker,
    /// completion. The first that holds wins.
    pub fn check_stop(&self, opts: &RunOptions, complete: bool) -> Option<StopReason> {
        if opts.max_sessions.is_some_and(|max| self.session_count >= max) {
            return Some(StopReason::MaxSessions);
        }
        if self.consecutive_failures >= opts.max_failures {
            return Some(StopReason::CircuitBreaker);
        }
        if complete {
            return Some(StopReason::Complete);
        }
        None
    }

    /// Count one finished session. A success resets the breaker and credits
    /// every feature that flipped to passing.
    pub fn record(&mut self, success: bool, delta: i64) {
        self.session_count += 1;
        if success {
            self.consecutive_failures = 0;
            self.features_completed += u32::try_from(delta).unwrap_or(0);
        } else {
            self.consecutive_failures += 1;
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }
}

// ---------------------------------------------------------------------------
// Reporting
// ---------------------------------------------------------------------------

/// What happened in one session. Reporting only.
#[derive(Debug, Clone, Serialize)]
pub struct SessionMetrics {
    pub session: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub feature_id: String,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    pub success: bool,
    pub signal: RunnerSignal,
    /// Change in the passing count across the session.
    pub delta: i64,
    pub tool_calls: u32,
    pub text_parts: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub stop_reason: StopReason,
    pub sessions_run: u32,
    pub features_completed: u32,
    pub consecutive_failures: u32,
    pub progress: Progress,
    pub started_at: DateTime<Utc>,
    pub elapsed_secs: f64,
    pub sessions: Vec<SessionMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<DryRunPreview>,
}
