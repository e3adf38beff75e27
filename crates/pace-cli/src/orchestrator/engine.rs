use anyhow::Context;
use chrono::Utc;
use pace_agent::{AgentRunner, SessionRequest};
use pace_core::feature::{Feature, FeatureList, FeatureStore, Progress};
use pace_core::progress::ProgressLog;
use serde::Serialize;

use super::evaluate::{await_terminal, is_success, Observation, RunnerSignal};
use super::options::RunOptions;
use super::state::{OrchestratorState, RunSummary, SessionMetrics, StopReason};
use crate::prompt;

/// What a dry run would have dispatched.
#[derive(Debug, Clone, Serialize)]
pub struct DryRunPreview {
    pub feature_id: String,
    pub description: String,
    pub priority: String,
    pub prompt: String,
}

type SessionHook = Box<dyn FnMut(&SessionMetrics, &OrchestratorState) + Send>;

/// Drives one run: one session in flight at a time, until a stop condition
/// holds. Owns the run's [`OrchestratorState`].
pub struct Orchestrator<R> {
    runner: R,
    opts: RunOptions,
    store: FeatureStore,
    state: OrchestratorState,
    sessions: Vec<SessionMetrics>,
    on_session: Option<SessionHook>,
}

impl<R: AgentRunner> Orchestrator<R> {
    pub fn new(runner: R, opts: RunOptions) -> Self {
        let store = FeatureStore::new(opts.feature_path());
        Self {
            runner,
            opts,
            store,
            state: OrchestratorState::new(),
            sessions: Vec::new(),
            on_session: None,
        }
    }

    /// Called after every session with its metrics and the updated counters.
    pub fn on_session(
        mut self,
        hook: impl FnMut(&SessionMetrics, &OrchestratorState) + Send + 'static,
    ) -> Self {
        self.on_session = Some(Box::new(hook));
        self
    }

    pub fn state(&self) -> &OrchestratorState {
        &self.state
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Run until complete, the session cap, or the circuit breaker.
    ///
    /// Session failures never surface here; they only count toward the
    /// breaker. An unreadable feature list is fatal.
    pub async fn run(&mut self) -> anyhow::Result<RunSummary> {
        let list = self.load()?;
        let mut progress = list.progress();
        if list.is_complete() {
            tracing::info!(total = progress.total, "nothing to do: every feature passes");
            return Ok(self.summary(StopReason::Complete, progress, None));
        }
        tracing::info!(
            passing = progress.passing,
            total = progress.total,
            max_sessions = ?self.opts.max_sessions,
            max_failures = self.opts.max_failures,
            "starting run"
        );

        let mut preview = None;
        let reason = loop {
            let list = self.load()?;
            progress = list.progress();
            if let Some(reason) = self.state.check_stop(&self.opts, list.is_complete()) {
                break reason;
            }
            let Some(feature) = list.next_feature().cloned() else {
                break StopReason::Complete;
            };

            let prompt = prompt::build(
                &feature,
                &progress,
                &self.progress_log(),
                &self.opts.feature_file,
            );
            if self.opts.dry_run {
                preview = Some(DryRunPreview {
                    feature_id: feature.id.clone(),
                    description: feature.description.clone(),
                    priority: feature.priority_label().to_string(),
                    prompt,
                });
                break StopReason::DryRun;
            }

            let (metrics, after) = self.run_session(&feature, prompt, progress.passing).await?;
            self.state.record(metrics.success, metrics.delta);
            if let Some(hook) = self.on_session.as_mut() {
                hook(&metrics, &self.state);
            }
            self.sessions.push(metrics);

            progress = after.progress();
            if let Some(reason) = self.state.check_stop(&self.opts, after.is_complete()) {
                break reason;
            }
            if !self.opts.delay.is_zero() {
                tracing::debug!(delay_ms = self.opts.delay.as_millis() as u64, "pausing before next session");
                tokio::time::sleep(self.opts.delay).await;
            }
        };

        tracing::info!(
            reason = %reason,
            sessions = self.state.session_count,
            completed = self.state.features_completed,
            "run stopped"
        );
        Ok(self.summary(reason, progress, preview))
    }

    async fn run_session(
        &self,
        feature: &Feature,
        prompt: String,
        passing_before: usize,
    ) -> anyhow::Result<(SessionMetrics, FeatureList)> {
        let session = self.state.session_count + 1;
        let started_at = Utc::now();
        tracing::info!(
            session,
            feature_id = %feature.id,
            priority = feature.priority_label(),
            "starting session"
        );

        let request = SessionRequest {
            prompt,
            feature_id: feature.id.clone(),
            project_dir: self.opts.project_dir.clone(),
        };

        // Subscribe first: a fast runner may finish before send_prompt returns.
        let mut events = self.runner.subscribe();
        let (session_id, observation) = match self.runner.create_session(&request).await {
            Err(e) => (None, Observation::dispatch_failed(e.to_string())),
            Ok(sid) => match self.runner.send_prompt(&sid, &request).await {
                Err(e) => (Some(sid), Observation::dispatch_failed(e.to_string())),
                Ok(()) => {
                    let observation = await_terminal(&mut events, &sid).await;
                    (Some(sid), observation)
                }
            },
        };
        drop(events);

        let after = self.load()?;
        let delta = after.progress().passing as i64 - passing_before as i64;
        let success = is_success(&observation.signal, delta);

        if success {
            tracing::info!(session, feature_id = %feature.id, delta, "session succeeded");
        } else {
            let reason = match &observation.signal {
                RunnerSignal::Idle => "agent finished but no feature started passing",
                other => other.message().unwrap_or("unknown failure"),
            };
            tracing::warn!(
                session,
                feature_id = %feature.id,
                failures = self.state.consecutive_failures + 1,
                "session failed: {reason}"
            );
        }

        let metrics = SessionMetrics {
            session,
            session_id,
            feature_id: feature.id.clone(),
            started_at,
            ended_at: Some(Utc::now()),
            success,
            signal: observation.signal,
            delta,
            tool_calls: observation.tool_calls,
            text_parts: observation.text_parts,
        };
        Ok((metrics, after))
    }

    fn load(&self) -> anyhow::Result<FeatureList> {
        self.store
            .load()
            .with_context(|| format!("failed to load {}", self.store.path().display()))
    }

    fn progress_log(&self) -> ProgressLog {
        let path = self.opts.progress_path();
        ProgressLog::load(&path).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "progress log unreadable; prompting without it");
            ProgressLog::default()
        })
    }

    fn summary(
        &mut self,
        stop_reason: StopReason,
        progress: Progress,
        dry_run: Option<DryRunPreview>,
    ) -> RunSummary {
        RunSummary {
            stop_reason,
            sessions_run: self.state.session_count,
            features_completed: self.state.features_completed,
            consecutive_failures: self.state.consecutive_failures,
            progress,
            started_at: self.state.started_at,
            elapsed_secs: self.state.elapsed_secs(),
            sessions: std::mem::take(&mut self.sessions),
            dry_run,
        }
    }
}
