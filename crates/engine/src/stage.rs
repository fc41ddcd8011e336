// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The execution loop.
//!
//! A [`Stage`] owns one session and its storage. It hands out one job at a
//! time, runs it, records the outcome and checkpoints before returning.
//! Callers drive it either step by step ([`Stage::next_job`] and
//! [`Stage::run_current_job`], as the agent does for a remote controller)
//! or with [`Stage::run_all`] and a local [`Interaction`].

use crate::interaction::{Choice, CrashDecision, Interaction, Prompt, PromptPhase, SessionControl, Verb};
use crate::io_log::{IoLine, IoLogWriter};
use crate::runner::{Exit, JobRunner, RunSpec};
use cb_core::{
    parse_records, render_records, CertificationStatus, Clock, Job, JobId, JobKind, JobResult,
    JobStatus, NextStep, Outcome, RerunKind, Selection, Session, SessionError, SessionFlag,
    SessionSummary,
};
use cb_plan::{bootstrap_list, resolve, Problem, ProviderSet, ResolveError};
use cb_storage::{SessionStorage, StorageError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

const EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("{0} needs a comment")]
    CommentRequired(JobId),
    #[error("'{verb}' is not a valid choice for {job}")]
    InvalidChoice { job: JobId, verb: Verb },
    #[error("{job} is not the current job (current: {})", current.as_ref().map_or("none", JobId::as_str))]
    NotCurrent { job: JobId, current: Option<JobId> },
    #[error("unknown job {0}")]
    UnknownJob(JobId),
    #[error("session was cancelled")]
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct StageConfig {
    /// Cap on runs of one job, including crash reruns.
    pub max_attempts: u32,
    /// Run failed and crashed jobs again before declaring the flow complete.
    pub auto_retry: bool,
    /// Applied to jobs without their own timeout.
    pub default_timeout: Option<Duration>,
    /// Commands run as this user unless the job names one.
    pub normal_user: Option<String>,
    /// Operator prompts fall back to their default after this long.
    pub prompt_timeout: Option<Duration>,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            auto_retry: false,
            default_timeout: None,
            normal_user: None,
            prompt_timeout: None,
        }
    }
}

impl StageConfig {
    cb_core::setters! {
        set { max_attempts: u32, auto_retry: bool }
        option {
            default_timeout: Duration,
            normal_user: String,
            prompt_timeout: Duration,
        }
    }
}

/// Shared collaborators of a stage.
pub struct StageDeps<R, C> {
    pub providers: Arc<ProviderSet>,
    pub runner: Arc<R>,
    pub clock: C,
    pub config: StageConfig,
}

/// Published while jobs run, for IO streaming and progress display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StageEvent {
    JobStarted { job_id: JobId },
    Io { job_id: JobId, line: IoLine },
    JobFinished { job_id: JobId, result: JobResult },
}

/// Cancels the running job and halts the loop.
///
/// Cloned out of the stage so it can be used while the stage itself is
/// busy running a job.
#[derive(Clone, Default)]
pub struct CancelHandle {
    requested: Arc<AtomicBool>,
    token: Arc<Mutex<CancellationToken>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.requested.store(true, Ordering::SeqCst);
        self.token.lock().cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Token for the next job; already cancelled once a cancel was requested.
    fn job_token(&self) -> CancellationToken {
        let mut token = self.token.lock();
        if !self.is_cancelled() {
            *token = CancellationToken::new();
        }
        token.clone()
    }
}

/// What the caller should do next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "kebab-case")]
pub enum Step {
    Prompt(Prompt),
    /// The operator must decide whether a crashed job runs again.
    CrashPending { job: JobId, attempts: u32, can_rerun: bool },
    Done(SessionSummary),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum StepOutcome {
    Finished { job: JobId, result: JobResult },
    /// The command ran; the operator must give a verdict.
    AwaitingVerdict { job: JobId, result: JobResult },
    Quit,
}

pub struct Stage<R: JobRunner, C: Clock> {
    session: Session,
    storage: SessionStorage,
    providers: Arc<ProviderSet>,
    runner: Arc<R>,
    clock: C,
    config: StageConfig,
    events: broadcast::Sender<StageEvent>,
    cancel: CancelHandle,
    pending_verdict: Option<(JobId, JobResult)>,
    problems: Vec<Problem>,
}

impl<R: JobRunner, C: Clock> Stage<R, C> {
    /// Create a session for `plan_id` in `storage`.
    ///
    /// When the plan has bootstrap jobs only those are selected at first;
    /// the full run list is resolved once their resources are known. An
    /// empty selection removes the storage again.
    pub fn start(
        storage: SessionStorage,
        deps: StageDeps<R, C>,
        plan_id: &str,
        selection: Selection,
    ) -> Result<Self, StageError> {
        let title = deps
            .providers
            .test_plan(plan_id)
            .map(|p| if p.name.is_empty() { p.id.clone() } else { p.name.clone() })
            .unwrap_or_else(|| plan_id.to_string());
        let mut session = Session::new(storage.id().clone(), title, deps.clock.epoch_ms());
        session.metadata.test_plan = Some(plan_id.to_string());
        session.metadata.providers_hash = Some(deps.providers.hash());

        let selected = bootstrap_list(&deps.providers, plan_id, &selection).and_then(|boot| {
            if boot.run_list.is_empty() {
                resolve(&deps.providers, plan_id, &selection, &session.resources).map(|r| (r, false))
            } else {
                Ok((boot, true))
            }
        });
        let (resolution, bootstrapping) = match selected {
            Ok(selected) => selected,
            Err(e) => {
                discard(storage);
                return Err(e.into());
            }
        };
        let problems = resolution.problems;
        session.metadata.selection = selection;
        session.update_run_list(resolution.jobs.into_values(), resolution.desired, resolution.run_list);
        session.set_flag(SessionFlag::Bootstrapping, bootstrapping);

        let stage = Self::assemble(session, storage, deps, problems);
        stage.checkpoint()?;
        tracing::info!(
            session_id = %stage.session.id,
            plan = plan_id,
            jobs = stage.session.run_list.len(),
            bootstrapping,
            "session started"
        );
        Ok(stage)
    }

    /// Load the session in `storage`, repairing any job left running.
    pub fn resume(storage: SessionStorage, deps: StageDeps<R, C>) -> Result<Self, StageError> {
        let mut session = storage.load_session(&deps.clock)?;
        let current = deps.providers.hash();
        if session.metadata.providers_hash.as_deref().is_some_and(|h| h != current) {
            tracing::warn!(
                session_id = %session.id,
                "job definitions changed since the session started; using the stored ones"
            );
        }
        session.set_flag(SessionFlag::Cancelled, false);
        let stage = Self::assemble(session, storage, deps, Vec::new());
        tracing::info!(session_id = %stage.session.id, "session resumed");
        Ok(stage)
    }

    fn assemble(
        session: Session,
        storage: SessionStorage,
        deps: StageDeps<R, C>,
        problems: Vec<Problem>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            session,
            storage,
            providers: deps.providers,
            runner: deps.runner,
            clock: deps.clock,
            config: deps.config,
            events,
            cancel: CancelHandle::default(),
            pending_verdict: None,
            problems,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn storage(&self) -> &SessionStorage {
        &self.storage
    }

    /// Selection problems reported while resolving this session.
    pub fn problems(&self) -> &[Problem] {
        &self.problems
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StageEvent> {
        self.events.subscribe()
    }

    /// Advance to the next decision point.
    ///
    /// Jobs that can never start are settled on the way, and the full run
    /// list is resolved once bootstrapping is complete.
    pub fn next_job(&mut self) -> Result<Step, StageError> {
        loop {
            if self.cancel.is_cancelled() {
                self.mark_cancelled()?;
                return Ok(Step::Done(self.session.summary()));
            }
            match self.session.next_step() {
                NextStep::Busy(id) => {
                    if let Some((pending, result)) = &self.pending_verdict {
                        if *pending == id {
                            let job = self.job(&id)?.clone();
                            return Ok(Step::Prompt(Prompt::verdict(job, result.clone())));
                        }
                    }
                    tracing::warn!(job_id = %id, "job was left running, treating it as crashed");
                    self.session.mark_interrupted(None);
                    self.checkpoint()?;
                }
                NextStep::CrashPending(id) => {
                    let attempts = self.session.state(&id).map_or(0, |s| s.attempts);
                    let can_rerun = attempts < self.config.max_attempts;
                    return Ok(Step::CrashPending { job: id, attempts, can_rerun });
                }
                NextStep::Settle(id, result) => {
                    tracing::info!(
                        job_id = %id,
                        outcome = %result.outcome,
                        reason = result.comments.as_deref().unwrap_or_default(),
                        "job cannot run"
                    );
                    self.session.settle(&id, result.clone())?;
                    self.checkpoint()?;
                    self.emit(StageEvent::JobFinished { job_id: id, result });
                }
                NextStep::Run(id) => {
                    let job = self.job(&id)?.clone();
                    return Ok(Step::Prompt(Prompt::start(job)));
                }
                NextStep::Done if self.session.has_flag(SessionFlag::Bootstrapping) => {
                    self.finish_bootstrap()?;
                }
                NextStep::Done => {
                    if self.config.auto_retry && !self.session.has_flag(SessionFlag::FlowCompleted) {
                        let retry =
                            self.session.rerun_candidates(RerunKind::Auto, self.config.max_attempts);
                        if !retry.is_empty() {
                            let rearmed = self.session.prepare_rerun(&retry, self.config.max_attempts)?;
                            self.checkpoint()?;
                            tracing::info!(jobs = ?rearmed, "retrying failed jobs");
                            continue;
                        }
                    }
                    if !self.session.has_flag(SessionFlag::FlowCompleted) {
                        self.session.set_flag(SessionFlag::FlowCompleted, true);
                        self.session.set_flag(SessionFlag::Incomplete, false);
                        self.checkpoint()?;
                        let summary = self.session.summary();
                        tracing::info!(
                            session_id = %self.session.id,
                            pass = summary.pass,
                            fail = summary.fail,
                            crash = summary.crash,
                            skip = summary.skip,
                            "all jobs attempted"
                        );
                    }
                    return Ok(Step::Done(self.session.summary()));
                }
            }
        }
    }

    /// Apply the operator's `choice` to job `id`.
    ///
    /// Repeating a request for a job that already finished returns its
    /// recorded result without running anything.
    pub async fn run_current_job(
        &mut self,
        id: &JobId,
        choice: Choice,
    ) -> Result<StepOutcome, StageError> {
        let state = self.session.state(id).ok_or_else(|| StageError::UnknownJob(id.clone()))?;
        if state.status == JobStatus::Finished {
            return Ok(StepOutcome::Finished { job: id.clone(), result: state.result.clone() });
        }
        let job = self.job(id)?.clone();

        if let Some((pending, result)) = &self.pending_verdict {
            if pending != id {
                return Err(StageError::NotCurrent { job: id.clone(), current: Some(pending.clone()) });
            }
            let prompt = Prompt::verdict(job.clone(), result.clone());
            check_choice(&prompt, &choice)?;
            if choice.verb == Verb::Quit {
                // The verdict stays pending for when the operator returns
                tracing::info!(session_id = %self.session.id, job_id = %id, "operator quit at verdict");
                return Ok(StepOutcome::Quit);
            }
            let Some((_, mut result)) = self.pending_verdict.take() else {
                return Err(StageError::NotCurrent { job: id.clone(), current: None });
            };
            let outcome = verdict_outcome(choice.verb);
            if let Some(comment) = choice.comment_text() {
                result.comments = Some(comment.to_string());
            }
            return self.record(&job, outcome, result);
        }

        match self.session.next_step() {
            NextStep::Run(next) if next == *id => {}
            NextStep::Run(next) | NextStep::Busy(next) | NextStep::CrashPending(next) => {
                return Err(StageError::NotCurrent { job: id.clone(), current: Some(next) });
            }
            _ => return Err(StageError::NotCurrent { job: id.clone(), current: None }),
        }
        let prompt = Prompt::start(job.clone());
        check_choice(&prompt, &choice)?;

        match choice.verb {
            Verb::Quit => {
                tracing::info!(session_id = %self.session.id, job_id = %id, "operator quit");
                Ok(StepOutcome::Quit)
            }
            Verb::Run => self.execute(&job).await,
            verb => {
                let mut result = JobResult::default();
                if let Some(comment) = choice.comment_text() {
                    result.comments = Some(comment.to_string());
                }
                self.session.begin(id, self.clock.epoch_ms())?;
                self.record(&job, verdict_outcome(verb), result)
            }
        }
    }

    /// Rerun or keep a crashed job.
    pub fn resolve_crash(&mut self, id: &JobId, rerun: bool) -> Result<(), StageError> {
        if rerun {
            self.session.rerun(id, self.config.max_attempts)?;
            tracing::info!(job_id = %id, "crashed job will run again");
        } else {
            self.session.keep_crash(id)?;
            tracing::info!(job_id = %id, "keeping crash outcome");
        }
        self.checkpoint()
    }

    /// Jobs the operator may run again now that the flow is complete.
    ///
    /// Empty while jobs remain or once the session was cancelled.
    pub fn rerun_candidates(&self) -> Vec<JobId> {
        if self.cancel.is_cancelled()
            || self.session.has_flag(SessionFlag::Cancelled)
            || !self.session.has_flag(SessionFlag::FlowCompleted)
        {
            return Vec::new();
        }
        self.session.rerun_candidates(RerunKind::Manual, self.config.max_attempts)
    }

    /// Re-arm the chosen candidates, plus their failed dependencies.
    pub fn prepare_rerun(&mut self, ids: &[JobId]) -> Result<Vec<JobId>, StageError> {
        if self.cancel.is_cancelled() {
            return Err(StageError::Cancelled);
        }
        let rearmed = self.session.prepare_rerun(ids, self.config.max_attempts)?;
        self.checkpoint()?;
        tracing::info!(session_id = %self.session.id, jobs = ?rearmed, "jobs will run again");
        Ok(rearmed)
    }

    /// Drive every remaining job, asking `ui` where an operator is needed.
    pub async fn run_all(
        &mut self,
        ui: &mut impl Interaction,
    ) -> Result<(SessionControl, SessionSummary), StageError> {
        loop {
            let prompt = match self.next_job()? {
                Step::Done(summary) => {
                    if self.session.has_flag(SessionFlag::Cancelled) {
                        return Ok((SessionControl::Cancel, summary));
                    }
                    let candidates: Vec<Job> = self
                        .rerun_candidates()
                        .iter()
                        .filter_map(|id| self.session.job(id).cloned())
                        .collect();
                    if !candidates.is_empty() {
                        let chosen = self.ask_reruns(ui, &candidates).await;
                        if !chosen.is_empty() {
                            self.prepare_rerun(&chosen)?;
                            continue;
                        }
                    }
                    return Ok((SessionControl::Continue, summary));
                }
                Step::CrashPending { job, attempts, can_rerun } => {
                    let decision = ui.decide_crash(&job, attempts, can_rerun).await;
                    self.resolve_crash(&job, can_rerun && decision == CrashDecision::Rerun)?;
                    continue;
                }
                Step::Prompt(prompt) => prompt,
            };

            let choice = if prompt.interactive || prompt.phase == PromptPhase::Verdict {
                self.ask(ui, &prompt).await
            } else {
                Choice::new(Verb::Run)
            };
            match self.run_current_job(&prompt.job.id, choice).await {
                Ok(StepOutcome::Quit) => return Ok((SessionControl::Cancel, self.session.summary())),
                Ok(StepOutcome::Finished { job, result }) => {
                    if let Some(job) = self.session.job(&job) {
                        ui.finished(job, &result);
                    }
                }
                Ok(StepOutcome::AwaitingVerdict { .. }) => {}
                Err(e @ (StageError::CommentRequired(_) | StageError::InvalidChoice { .. })) => {
                    ui.rejected(&prompt, &e.to_string());
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Remove the finished session from disk.
    pub fn finish(self) -> Result<SessionSummary, StageError> {
        let summary = self.session.summary();
        self.storage.remove()?;
        Ok(summary)
    }

    async fn ask(&self, ui: &mut impl Interaction, prompt: &Prompt) -> Choice {
        let Some(limit) = self.config.prompt_timeout else {
            return ui.choose(prompt).await;
        };
        match tokio::time::timeout(limit, ui.choose(prompt)).await {
            Ok(choice) => choice,
            Err(_) => {
                tracing::warn!(job_id = %prompt.job.id, default = %prompt.default, "prompt timed out");
                Choice::with_comment(prompt.default, "no operator response")
            }
        }
    }

    async fn ask_reruns(&self, ui: &mut impl Interaction, candidates: &[Job]) -> Vec<JobId> {
        let Some(limit) = self.config.prompt_timeout else {
            return ui.choose_reruns(candidates).await;
        };
        tokio::time::timeout(limit, ui.choose_reruns(candidates)).await.unwrap_or_else(|_| {
            tracing::warn!(candidates = candidates.len(), "rerun prompt timed out");
            Vec::new()
        })
    }

    async fn execute(&mut self, job: &Job) -> Result<StepOutcome, StageError> {
        let id = job.id.clone();
        // Only a marker written by this job may settle it after a reboot
        self.storage.clear_resume_marker();
        self.session.begin(&id, self.clock.epoch_ms())?;
        self.checkpoint()?;
        self.emit(StageEvent::JobStarted { job_id: id.clone() });

        let log_path = self.storage.io_log_path(&id);
        let mut result = JobResult {
            io_log: log_path.strip_prefix(self.storage.dir()).ok().map(|p| p.to_path_buf()),
            started_at_ms: Some(self.clock.epoch_ms()),
            ..JobResult::default()
        };

        let Some(spec) = self.run_spec(job) else {
            let result = result.with_comments("job has no command");
            return self.record(job, Outcome::Fail, result);
        };
        let token = self.cancel.job_token();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut log = IoLogWriter::create(&log_path);
        let events = self.events.clone();
        let runner = Arc::clone(&self.runner);
        let drain = async {
            while let Some(line) = rx.recv().await {
                log.write(&line);
                let _ = events.send(StageEvent::Io { job_id: id.clone(), line });
            }
        };
        let (output, ()) = tokio::join!(runner.run(spec, tx, token), drain);
        log.finish();

        let (outcome, judged) = match &output {
            Ok(out) => {
                result.duration_ms = Some(out.duration.as_millis() as u64);
                match out.exit {
                    Exit::Code(code) => {
                        result.return_code = Some(code);
                        (if code == 0 { Outcome::Pass } else { Outcome::Fail }, true)
                    }
                    Exit::Signal(signal) => {
                        result.comments = Some(format!("killed by signal {signal}"));
                        (Outcome::Fail, true)
                    }
                    Exit::TimedOut => {
                        result.comments = Some("timed out".to_string());
                        (Outcome::Fail, false)
                    }
                    Exit::Cancelled => {
                        result.comments = Some("cancelled".to_string());
                        (Outcome::Fail, false)
                    }
                }
            }
            Err(e) => {
                tracing::error!(job_id = %id, error = %e, "job could not run");
                result.comments = Some(e.to_string());
                (Outcome::Fail, false)
            }
        };

        if let Ok(out) = &output {
            match job.kind {
                JobKind::Resource if outcome == Outcome::Pass => {
                    let parsed = parse_records(&String::from_utf8_lossy(&out.stdout));
                    if parsed.dropped > 0 {
                        tracing::warn!(job_id = %id, dropped = parsed.dropped, "dropped malformed resource records");
                    }
                    tracing::info!(job_id = %id, records = parsed.records.len(), "resource collected");
                    self.session.set_resource_records(&id, parsed.records);
                }
                JobKind::Attachment => {
                    let path = self.storage.attachment_path(&id);
                    if let Err(e) = std::fs::write(&path, &out.stdout) {
                        tracing::warn!(job_id = %id, path = %path.display(), error = %e, "failed to save attachment");
                    }
                }
                _ => {}
            }
        }

        if job.kind.operator_verdict() && judged {
            result.outcome = outcome;
            self.pending_verdict = Some((id.clone(), result.clone()));
            return Ok(StepOutcome::AwaitingVerdict { job: id, result });
        }
        self.record(job, outcome, result)
    }

    /// Finish the running job and checkpoint.
    fn record(
        &mut self,
        job: &Job,
        outcome: Outcome,
        mut result: JobResult,
    ) -> Result<StepOutcome, StageError> {
        if let Some(started) = result.started_at_ms {
            if result.duration_ms.is_none() {
                result.duration_ms = Some(self.clock.epoch_ms().saturating_sub(started));
            }
        }
        self.session.transition(&job.id, outcome, result)?;
        self.checkpoint()?;
        let result = self.session.state(&job.id).map(|s| s.result.clone()).unwrap_or_default();
        tracing::info!(job_id = %job.id, %outcome, "job finished");
        self.emit(StageEvent::JobFinished { job_id: job.id.clone(), result: result.clone() });
        Ok(StepOutcome::Finished { job: job.id.clone(), result })
    }

    fn run_spec(&self, job: &Job) -> Option<RunSpec> {
        let command = job.command.clone()?;
        let share = self.storage.share_dir();
        let mut env = BTreeMap::new();
        for name in &job.environ {
            if let Ok(value) = std::env::var(name) {
                env.insert(name.clone(), value);
            }
        }
        env.insert("CB_SESSION_ID".to_string(), self.session.id.to_string());
        env.insert("CB_SESSION_SHARE".to_string(), share.display().to_string());
        for resource in job.resource_dependencies().unwrap_or_default() {
            let records = self.session.resource_records(&resource);
            env.insert(resource_env_name(&resource), render_records(records));
        }
        Some(RunSpec {
            job_id: job.id.clone(),
            command,
            cwd: share,
            env,
            user: job.user.clone().or_else(|| self.config.normal_user.clone()),
            timeout: job.timeout.map(Duration::from_secs).or(self.config.default_timeout),
        })
    }

    fn finish_bootstrap(&mut self) -> Result<(), StageError> {
        let plan = self.session.metadata.test_plan.clone().unwrap_or_default();
        let resolution =
            resolve(&self.providers, &plan, &self.session.metadata.selection, &self.session.resources)?;
        self.problems.extend(resolution.problems);
        self.session.update_run_list(
            resolution.jobs.into_values(),
            resolution.desired,
            resolution.run_list,
        );
        self.session.set_flag(SessionFlag::Bootstrapping, false);
        self.checkpoint()?;
        tracing::info!(
            session_id = %self.session.id,
            jobs = self.session.run_list.len(),
            "bootstrap finished, run list resolved"
        );
        Ok(())
    }

    fn mark_cancelled(&mut self) -> Result<(), StageError> {
        if self.session.has_flag(SessionFlag::Cancelled) {
            return Ok(());
        }
        if let Some((id, result)) = self.pending_verdict.take() {
            if let Some(job) = self.session.job(&id).cloned() {
                self.record(&job, Outcome::Fail, result.with_comments("cancelled"))?;
            }
        }
        self.session.set_flag(SessionFlag::Cancelled, true);
        self.checkpoint()?;
        tracing::info!(session_id = %self.session.id, "session cancelled");
        Ok(())
    }

    fn job(&self, id: &JobId) -> Result<&Job, StageError> {
        self.session.job(id).ok_or_else(|| StageError::UnknownJob(id.clone()))
    }

    fn checkpoint(&self) -> Result<(), StageError> {
        self.storage.save_session(&self.session, &self.clock)?;
        Ok(())
    }

    fn emit(&self, event: StageEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

fn check_choice(prompt: &Prompt, choice: &Choice) -> Result<(), StageError> {
    let job = &prompt.job;
    if !prompt.allows(choice.verb) {
        return Err(StageError::InvalidChoice { job: job.id.clone(), verb: choice.verb });
    }
    let skipping = matches!(choice.verb, Verb::Skip | Verb::Comment);
    let needs_comment = choice.verb == Verb::Comment
        || (skipping && job.certification_status == CertificationStatus::Blocker);
    if needs_comment && choice.comment_text().is_none() {
        return Err(StageError::CommentRequired(job.id.clone()));
    }
    Ok(())
}

fn verdict_outcome(verb: Verb) -> Outcome {
    match verb {
        Verb::Pass => Outcome::Pass,
        Verb::Fail => Outcome::Fail,
        Verb::Run | Verb::Skip | Verb::Comment | Verb::Quit => Outcome::Skip,
    }
}

/// `CB_RESOURCE_<NAME>` for a resource job, from its partial id.
fn resource_env_name(id: &JobId) -> String {
    let name: String = id
        .partial()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    format!("CB_RESOURCE_{name}")
}

fn discard(storage: SessionStorage) {
    let id = storage.id().clone();
    if let Err(e) = storage.remove() {
        tracing::warn!(session_id = %id, error = %e, "failed to remove unused session");
    }
}

#[cfg(test)]
#[path = "stage_tests.rs"]
mod tests;
