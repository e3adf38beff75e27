use crate::output::print_json;
use anyhow::{bail, Context};
use clap::Args;
use pace_agent::{ClaudeOptions, ClaudeRunner};
use pace_cli::orchestrator::{Orchestrator, RunOptions, RunSummary, StopReason};
use pace_core::config::{AgentConfig, Config, WarnLevel};
use std::path::Path;
use std::time::Duration;

// ---------------------------------------------------------------------------
// RunExit: typed non-zero exit codes, mapped to a process exit in main
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum RunExit {
    CircuitBreaker { failures: u32 },
    MaxSessions { sessions: u32, remaining: usize },
}

impl RunExit {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunExit::CircuitBreaker { .. } => 2,
            RunExit::MaxSessions { .. } => 3,
        }
    }

    fn from_summary(summary: &RunSummary) -> Option<Self> {
        match summary.stop_reason {
            StopReason::CircuitBreaker => Some(RunExit::CircuitBreaker {
                failures: summary.consecutive_failures,
            }),
            StopReason::MaxSessions => Some(RunExit::MaxSessions {
                sessions: summary.sessions_run,
                remaining: summary.progress.failing,
            }),
            StopReason::Complete | StopReason::DryRun => None,
        }
    }
}

impl std::fmt::Display for RunExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunExit::CircuitBreaker { failures } => {
                write!(f, "stopped after {failures} consecutive failed session(s)")
            }
            RunExit::MaxSessions {
                sessions,
                remaining,
            } => {
                write!(
                    f,
                    "session limit reached after {sessions} session(s); {remaining} feature(s) still failing"
                )
            }
        }
    }
}

impl std::error::Error for RunExit {}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Stop after this many sessions
    #[arg(long)]
    pub max_sessions: Option<u32>,

    /// Consecutive failed sessions before giving up
    #[arg(long)]
    pub max_failures: Option<u32>,

    /// Pause between sessions, in milliseconds
    #[arg(long)]
    pub delay_ms: Option<u64>,

    /// Show the next feature and its prompt without running the agent
    #[arg(long)]
    pub dry_run: bool,
}

pub fn run(root: &Path, args: RunArgs, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let opts = resolve_options(root, &config, &args, json)?;

    if !opts.dry_run {
        which::which(&config.agent.command).with_context(|| {
            format!("agent command '{}' not found on PATH", config.agent.command)
        })?;
    }

    let runner = ClaudeRunner::new(claude_options(&config.agent));
    let mut orchestrator = Orchestrator::new(runner, opts);
    if !json {
        orchestrator = orchestrator.on_session(|m, state| {
            let mark = if m.success { "ok" } else { "FAILED" };
            println!(
                "Session {:>3}  {:<16} {:<6}  tools={} delta={:+}  (failures in a row: {})",
                m.session,
                m.feature_id,
                mark,
                m.tool_calls,
                m.delta,
                state.consecutive_failures
            );
        });
    }

    let rt = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    let summary = rt.block_on(orchestrator.run())?;

    if json {
        print_json(&summary)?;
    } else {
        print_summary(&summary);
    }

    match RunExit::from_summary(&summary) {
        Some(exit) => Err(exit.into()),
        None => Ok(()),
    }
}

/// Config values overridden by command-line flags.
fn resolve_options(
    root: &Path,
    config: &Config,
    args: &RunArgs,
    json: bool,
) -> anyhow::Result<RunOptions> {
    for warning in config.validate() {
        match warning.level {
            WarnLevel::Error => bail!("invalid config: {}", warning.message),
            WarnLevel::Warning => tracing::warn!("{}", warning.message),
        }
    }

    let mut opts = RunOptions::from_config(root, config);
    if let Some(n) = args.max_sessions {
        opts.max_sessions = Some(n);
    }
    if let Some(n) = args.max_failures {
        if n == 0 {
            bail!("--max-failures must be at least 1");
        }
        opts.max_failures = n;
    }
    if let Some(ms) = args.delay_ms {
        opts.delay = Duration::from_millis(ms);
    }
    opts.dry_run = args.dry_run;
    opts.json = json;
    Ok(opts)
}

fn claude_options(agent: &AgentConfig) -> ClaudeOptions {
    ClaudeOptions {
        command: agent.command.clone(),
        model: agent.model.clone(),
        max_turns: agent.max_turns,
        permission_mode: agent.permission_mode.clone(),
        allowed_tools: agent.allowed_tools.clone(),
        ..ClaudeOptions::default()
    }
}

fn print_summary(summary: &RunSummary) {
    if let Some(preview) = &summary.dry_run {
        println!("Dry run: next feature is {} [{}]", preview.feature_id, preview.priority);
        println!("  {}", preview.description);
        println!();
        println!("Prompt:");
        println!("{}", preview.prompt);
        return;
    }

    let p = &summary.progress;
    println!();
    println!("Stopped:    {}", summary.stop_reason);
    println!("Sessions:   {}", summary.sessions_run);
    println!("Completed:  {} feature(s)", summary.features_completed);
    println!(
        "Progress:   {}/{} passing ({:.1}%)",
        p.passing, p.total, p.percentage
    );
    println!("Elapsed:    {:.0}s", summary.elapsed_secs);
}
