// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session state machine.
//!
//! Per job: `not-started -> running -> finished(outcome)`. Finished is
//! sticky except for `crash`, which an operator can re-arm with
//! [`Session::rerun`]. At most one job is running at any time, and it is
//! always the one named by `metadata.running_job_id`.

use crate::expr::Requirement;
use crate::id::{JobId, SessionId};
use crate::job::{CertificationStatus, Job};
use crate::outcome::{JobResult, JobStatus, Outcome, ResumeMarker};
use crate::resource::ResourceRecord;
use crate::selection::Selection;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("unknown job {0}")]
    UnknownJob(JobId),
    #[error("job {job} is not running (running: {running:?})")]
    NotRunning { job: JobId, running: Option<JobId> },
    #[error("job {0} is already running")]
    AlreadyRunning(JobId),
    #[error("job {job} is {status}, expected not-started")]
    NotPending { job: JobId, status: JobStatus },
    #[error("job {job} cannot start: {reasons}")]
    CannotStart { job: JobId, reasons: String },
    #[error("crashed job {0} is waiting for a rerun decision")]
    CrashPending(JobId),
    #[error("job {0} did not crash")]
    NotCrashed(JobId),
    #[error("job {job} already ran {attempts} times")]
    RerunLimit { job: JobId, attempts: u32 },
    #[error("outcome must be decided")]
    UndecidedOutcome,
    #[error("job {0} is not a rerun candidate")]
    NotRerunnable(JobId),
}

/// Which finished jobs qualify for another run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RerunKind {
    /// Offered to the operator: every job that did not pass.
    Manual,
    /// Retried without asking: jobs that ran and failed or crashed.
    Auto,
}

/// Why a job cannot start yet, or never will.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InhibitorCause {
    /// Not on the run list.
    Undesired,
    /// A dependency has not finished.
    PendingDep,
    /// A dependency finished without passing.
    FailedDep,
    /// A referenced resource job has not finished.
    PendingResource,
    /// The resource expression did not hold.
    FailedResource,
}

crate::simple_display! {
    InhibitorCause {
        Undesired => "undesired",
        PendingDep => "pending dependency",
        FailedDep => "failed dependency",
        PendingResource => "pending resource",
        FailedResource => "resource requirement not met",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inhibitor {
    pub cause: InhibitorCause,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_job: Option<JobId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
}

impl Inhibitor {
    fn new(cause: InhibitorCause) -> Self {
        Self { cause, related_job: None, expression: None }
    }

    fn related(mut self, job: &JobId) -> Self {
        self.related_job = Some(job.clone());
        self
    }

    fn expression(mut self, expr: impl Into<String>) -> Self {
        self.expression = Some(expr.into());
        self
    }

    fn is_pending(&self) -> bool {
        matches!(
            self.cause,
            InhibitorCause::Undesired | InhibitorCause::PendingDep | InhibitorCause::PendingResource
        )
    }
}

impl std::fmt::Display for Inhibitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.cause)?;
        match (&self.related_job, &self.expression) {
            (_, Some(expr)) => write!(f, " ({expr})"),
            (Some(job), None) => write!(f, " ({job})"),
            (None, None) => Ok(()),
        }
    }
}

/// Mutable per-job record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobState {
    pub status: JobStatus,
    pub result: JobResult,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inhibitors: Vec<Inhibitor>,
    /// Number of times the job has been started.
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub effective_certification_status: CertificationStatus,
}

impl JobState {
    pub fn can_start(&self) -> bool {
        self.status == JobStatus::NotStarted && self.inhibitors.is_empty()
    }

    pub fn outcome(&self) -> Outcome {
        self.result.outcome
    }

    /// Result to record for a job that can never start, if that is known.
    pub fn settlement(&self) -> Option<JobResult> {
        if self.status != JobStatus::NotStarted
            || self.inhibitors.is_empty()
            || self.inhibitors.iter().any(Inhibitor::is_pending)
        {
            return None;
        }
        if let Some(dep) = self.inhibitors.iter().find(|i| i.cause == InhibitorCause::FailedDep) {
            let related = dep.related_job.as_ref().map(JobId::as_str).unwrap_or_default();
            return Some(
                JobResult::new(Outcome::Skip)
                    .with_comments(format!("required dependency '{related}' did not pass")),
            );
        }
        let reasons: Vec<_> =
            self.inhibitors.iter().filter_map(|i| i.expression.as_deref()).collect();
        Some(
            JobResult::new(Outcome::NotSupported)
                .with_comments(format!("resource requirement not met: {}", reasons.join("; "))),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionFlag {
    /// Jobs remain to be run.
    Incomplete,
    /// Only bootstrap resource jobs are selected so far.
    Bootstrapping,
    /// Every job on the run list was attempted.
    FlowCompleted,
    Cancelled,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub running_job_id: Option<JobId>,
    /// Opaque client data, persisted verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_blob: Option<String>,
    #[serde(default)]
    pub flags: BTreeSet<SessionFlag>,
    /// Digest of the job definitions the session was created from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub providers_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_plan: Option<String>,
    /// Selection the run list was resolved with; needed again after bootstrap.
    #[serde(default)]
    pub selection: Selection,
    /// Crashed job whose fate the operator has not decided.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_crash: Option<JobId>,
    #[serde(default)]
    pub created_at_ms: u64,
}

/// What the loop should do next, derived from the run list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextStep {
    /// First job in run order that may start now.
    Run(JobId),
    /// Job that can never start; record the given result for it.
    Settle(JobId, JobResult),
    /// A crash awaits an operator decision.
    CrashPending(JobId),
    /// A job is still running.
    Busy(JobId),
    Done,
}

/// Outcome counts over the run list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub total: usize,
    pub pass: usize,
    pub fail: usize,
    pub skip: usize,
    pub crash: usize,
    pub not_supported: usize,
    pub not_run: usize,
}

impl SessionSummary {
    pub fn has_failures(&self) -> bool {
        self.fail > 0 || self.crash > 0
    }
}

/// Durable record of one test-plan execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub title: String,
    /// Definitions of every job the session knows about.
    pub jobs: IndexMap<JobId, Job>,
    /// Jobs to run, in dependency order.
    pub run_list: Vec<JobId>,
    /// Jobs selected explicitly, before dependency closure.
    pub desired_job_list: Vec<JobId>,
    pub job_state_map: IndexMap<JobId, JobState>,
    /// Records captured from finished resource jobs.
    #[serde(default)]
    pub resources: IndexMap<JobId, Vec<ResourceRecord>>,
    pub metadata: SessionMetadata,
}

impl Session {
    pub fn new(id: SessionId, title: impl Into<String>, created_at_ms: u64) -> Self {
        let mut metadata = SessionMetadata { created_at_ms, ..SessionMetadata::default() };
        metadata.flags.insert(SessionFlag::Incomplete);
        Self {
            id,
            title: title.into(),
            jobs: IndexMap::new(),
            run_list: Vec::new(),
            desired_job_list: Vec::new(),
            job_state_map: IndexMap::new(),
            resources: IndexMap::new(),
            metadata,
        }
    }

    /// Replace the selection. States of already known jobs are kept.
    pub fn update_run_list(
        &mut self,
        jobs: impl IntoIterator<Item = Job>,
        desired: Vec<JobId>,
        run_list: Vec<JobId>,
    ) {
        for job in jobs {
            let state = self.job_state_map.entry(job.id.clone()).or_default();
            state.effective_certification_status = job.certification_status;
            self.jobs.insert(job.id.clone(), job);
        }
        self.desired_job_list = desired;
        self.run_list = run_list;
        self.update_readiness();
    }

    pub fn job(&self, id: &JobId) -> Option<&Job> {
        self.jobs.get(id)
    }

    pub fn state(&self, id: &JobId) -> Option<&JobState> {
        self.job_state_map.get(id)
    }

    pub fn has_flag(&self, flag: SessionFlag) -> bool {
        self.metadata.flags.contains(&flag)
    }

    pub fn set_flag(&mut self, flag: SessionFlag, on: bool) {
        if on {
            self.metadata.flags.insert(flag);
        } else {
            self.metadata.flags.remove(&flag);
        }
    }

    pub fn running_job(&self) -> Option<&JobId> {
        self.metadata.running_job_id.as_ref()
    }

    pub fn resource_records(&self, id: &JobId) -> &[ResourceRecord] {
        self.resources.get(id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Store output of a resource job; readiness is recomputed on its transition.
    pub fn set_resource_records(&mut self, id: &JobId, records: Vec<ResourceRecord>) {
        self.resources.insert(id.clone(), records);
    }

    /// Recompute inhibitors for every job in one pass.
    pub fn update_readiness(&mut self) {
        let updates: Vec<(JobId, Vec<Inhibitor>)> = self
            .job_state_map
            .iter()
            .map(|(id, state)| {
                let inhibitors = match (state.status, self.jobs.get(id)) {
                    (JobStatus::NotStarted, Some(job)) => self.inhibitors_for(job),
                    (JobStatus::NotStarted, None) => vec![Inhibitor::new(InhibitorCause::Undesired)],
                    _ => Vec::new(),
                };
                (id.clone(), inhibitors)
            })
            .collect();
        for (id, inhibitors) in updates {
            if let Some(state) = self.job_state_map.get_mut(&id) {
                state.inhibitors = inhibitors;
            }
        }
    }

    fn inhibitors_for(&self, job: &Job) -> Vec<Inhibitor> {
        if !self.run_list.contains(&job.id) {
            return vec![Inhibitor::new(InhibitorCause::Undesired)];
        }
        let mut out = Vec::new();

        for dep in &job.depends {
            match self.job_state_map.get(dep) {
                Some(s) if s.status == JobStatus::Finished && s.outcome() == Outcome::Pass => {}
                Some(s) if s.status != JobStatus::Finished => {
                    out.push(Inhibitor::new(InhibitorCause::PendingDep).related(dep));
                }
                _ => out.push(Inhibitor::new(InhibitorCause::FailedDep).related(dep)),
            }
        }

        for dep in &job.after {
            let pending = self.run_list.contains(dep)
                && self.job_state_map.get(dep).is_some_and(|s| s.status != JobStatus::Finished);
            if pending {
                out.push(Inhibitor::new(InhibitorCause::PendingDep).related(dep));
            }
        }

        for line in &job.requires {
            let req = match Requirement::parse(line) {
                Ok(req) => req,
                Err(_) => {
                    out.push(Inhibitor::new(InhibitorCause::FailedResource).expression(line.trim()));
                    continue;
                }
            };
            let resource = job.resource_job_id(&req);
            let finished =
                self.job_state_map.get(&resource).is_some_and(|s| s.status == JobStatus::Finished);
            if !finished {
                out.push(
                    Inhibitor::new(InhibitorCause::PendingResource)
                        .related(&resource)
                        .expression(req.text()),
                );
            } else if !req.evaluate(self.resource_records(&resource)) {
                out.push(
                    Inhibitor::new(InhibitorCause::FailedResource)
                        .related(&resource)
                        .expression(req.text()),
                );
            }
        }
        out
    }

    /// Mark `id` running. Refuses while another job runs or a crash is pending.
    pub fn begin(&mut self, id: &JobId, now_ms: u64) -> Result<(), SessionError> {
        if let Some(running) = &self.metadata.running_job_id {
            return Err(SessionError::AlreadyRunning(running.clone()));
        }
        if let Some(crashed) = &self.metadata.pending_crash {
            return Err(SessionError::CrashPending(crashed.clone()));
        }
        let state =
            self.job_state_map.get_mut(id).ok_or_else(|| SessionError::UnknownJob(id.clone()))?;
        if state.status != JobStatus::NotStarted {
            return Err(SessionError::NotPending { job: id.clone(), status: state.status });
        }
        if !state.inhibitors.is_empty() {
            let reasons: Vec<_> = state.inhibitors.iter().map(ToString::to_string).collect();
            return Err(SessionError::CannotStart { job: id.clone(), reasons: reasons.join(", ") });
        }
        state.status = JobStatus::Running;
        state.attempts += 1;
        state.result = JobResult { started_at_ms: Some(now_ms), ..JobResult::default() };
        self.metadata.running_job_id = Some(id.clone());
        Ok(())
    }

    /// Record the outcome of the running job. Fails without mutating if
    /// `id` is not the running job.
    pub fn transition(
        &mut self,
        id: &JobId,
        outcome: Outcome,
        mut result: JobResult,
    ) -> Result<(), SessionError> {
        if self.metadata.running_job_id.as_ref() != Some(id) {
            return Err(SessionError::NotRunning {
                job: id.clone(),
                running: self.metadata.running_job_id.clone(),
            });
        }
        if !outcome.is_decided() {
            return Err(SessionError::UndecidedOutcome);
        }
        let state =
            self.job_state_map.get_mut(id).ok_or_else(|| SessionError::UnknownJob(id.clone()))?;
        result.outcome = outcome;
        if result.started_at_ms.is_none() {
            result.started_at_ms = state.result.started_at_ms;
        }
        state.status = JobStatus::Finished;
        state.result = result;
        self.metadata.running_job_id = None;
        self.update_readiness();
        Ok(())
    }

    /// Finish a job that never started, e.g. because a dependency failed.
    pub fn settle(&mut self, id: &JobId, result: JobResult) -> Result<(), SessionError> {
        if !result.outcome.is_decided() {
            return Err(SessionError::UndecidedOutcome);
        }
        let state =
            self.job_state_map.get_mut(id).ok_or_else(|| SessionError::UnknownJob(id.clone()))?;
        if state.status != JobStatus::NotStarted {
            return Err(SessionError::NotPending { job: id.clone(), status: state.status });
        }
        state.status = JobStatus::Finished;
        state.result = result;
        self.update_readiness();
        Ok(())
    }

    /// Finish a job left running by a previous process.
    ///
    /// The outcome comes from the job's own marker when it wrote one before
    /// a planned reboot; otherwise the job crashed and must be decided on
    /// before anything else starts.
    pub fn mark_interrupted(&mut self, marker: Option<ResumeMarker>) -> Option<JobId> {
        let id = self.metadata.running_job_id.take()?;
        let (outcome, comments) = match marker {
            Some(m) if m.outcome.is_decided() => (m.outcome, m.comments),
            _ => (Outcome::Crash, Some("job was interrupted".to_string())),
        };
        if let Some(state) = self.job_state_map.get_mut(&id) {
            state.status = JobStatus::Finished;
            state.result.outcome = outcome;
            state.result.comments = comments;
        }
        if outcome == Outcome::Crash {
            self.metadata.pending_crash = Some(id.clone());
        }
        self.update_readiness();
        Some(id)
    }

    /// Re-arm a crashed job so it runs again.
    pub fn rerun(&mut self, id: &JobId, max_attempts: u32) -> Result<(), SessionError> {
        let state =
            self.job_state_map.get_mut(id).ok_or_else(|| SessionError::UnknownJob(id.clone()))?;
        if state.status != JobStatus::Finished || state.outcome() != Outcome::Crash {
            return Err(SessionError::NotCrashed(id.clone()));
        }
        if state.attempts >= max_attempts {
            return Err(SessionError::RerunLimit { job: id.clone(), attempts: state.attempts });
        }
        state.status = JobStatus::NotStarted;
        state.result = JobResult::default();
        if self.metadata.pending_crash.as_ref() == Some(id) {
            self.metadata.pending_crash = None;
        }
        self.update_readiness();
        Ok(())
    }

    /// Accept the crash as the final outcome.
    pub fn keep_crash(&mut self, id: &JobId) -> Result<(), SessionError> {
        if self.metadata.pending_crash.as_ref() != Some(id) {
            return Err(SessionError::NotCrashed(id.clone()));
        }
        self.metadata.pending_crash = None;
        Ok(())
    }

    /// Finished jobs on the run list that may run again, in run order.
    ///
    /// Jobs that already ran `max_attempts` times are left out.
    pub fn rerun_candidates(&self, kind: RerunKind, max_attempts: u32) -> Vec<JobId> {
        let mut seen = HashSet::new();
        self.run_list
            .iter()
            .filter(|id| seen.insert(*id))
            .filter(|id| self.is_rerun_candidate(id, kind, max_attempts))
            .cloned()
            .collect()
    }

    fn is_rerun_candidate(&self, id: &JobId, kind: RerunKind, max_attempts: u32) -> bool {
        let Some(state) = self.job_state_map.get(id) else { return false };
        if state.status != JobStatus::Finished || state.attempts >= max_attempts {
            return false;
        }
        match kind {
            RerunKind::Manual => matches!(
                state.outcome(),
                Outcome::Fail | Outcome::Crash | Outcome::Skip | Outcome::NotSupported
            ),
            RerunKind::Auto => {
                state.attempts > 0 && matches!(state.outcome(), Outcome::Fail | Outcome::Crash)
            }
        }
    }

    /// Re-arm `ids` for another run, together with the dependencies that
    /// kept them from passing and the dependents that were settled without
    /// starting because of them. Attempt counts are kept.
    ///
    /// Returns every re-armed job in run order. Nothing changes unless every
    /// id is a manual rerun candidate.
    pub fn prepare_rerun(&mut self, ids: &[JobId], max_attempts: u32) -> Result<Vec<JobId>, SessionError> {
        if let Some(running) = &self.metadata.running_job_id {
            return Err(SessionError::AlreadyRunning(running.clone()));
        }
        if let Some(crashed) = &self.metadata.pending_crash {
            return Err(SessionError::CrashPending(crashed.clone()));
        }
        let mut rearm: HashSet<JobId> = HashSet::new();
        let mut stack: Vec<JobId> = Vec::new();
        for id in ids {
            let state = self.state(id).ok_or_else(|| SessionError::UnknownJob(id.clone()))?;
            if !self.is_rerun_candidate(id, RerunKind::Manual, max_attempts) {
                if state.status == JobStatus::Finished && state.attempts >= max_attempts {
                    return Err(SessionError::RerunLimit { job: id.clone(), attempts: state.attempts });
                }
                return Err(SessionError::NotRerunnable(id.clone()));
            }
            stack.push(id.clone());
        }
        while let Some(id) = stack.pop() {
            if !rearm.insert(id.clone()) {
                continue;
            }
            for dep in self.jobs.get(&id).map(Job::hard_dependencies).unwrap_or_default() {
                if self.run_list.contains(&dep) && self.is_rerun_candidate(&dep, RerunKind::Manual, max_attempts) {
                    stack.push(dep);
                }
            }
        }
        // Run order has dependencies first, so one pass reaches every dependent
        for id in &self.run_list {
            let never_started = self
                .job_state_map
                .get(id)
                .is_some_and(|s| s.status == JobStatus::Finished && s.attempts == 0);
            let blocked_by_rearmed = self
                .jobs
                .get(id)
                .is_some_and(|j| j.hard_dependencies().iter().any(|dep| rearm.contains(dep)));
            if never_started && blocked_by_rearmed {
                rearm.insert(id.clone());
            }
        }

        let mut seen = HashSet::new();
        let order: Vec<JobId> =
            self.run_list.iter().filter(|id| rearm.contains(*id) && seen.insert(*id)).cloned().collect();
        for id in &order {
            if let Some(state) = self.job_state_map.get_mut(id) {
                state.status = JobStatus::NotStarted;
                state.result = JobResult::default();
            }
        }
        self.set_flag(SessionFlag::FlowCompleted, false);
        self.set_flag(SessionFlag::Incomplete, true);
        self.update_readiness();
        Ok(order)
    }

    pub fn next_step(&self) -> NextStep {
        if let Some(running) = &self.metadata.running_job_id {
            return NextStep::Busy(running.clone());
        }
        if let Some(crashed) = &self.metadata.pending_crash {
            return NextStep::CrashPending(crashed.clone());
        }
        for id in &self.run_list {
            let Some(state) = self.job_state_map.get(id) else { continue };
            if state.can_start() {
                return NextStep::Run(id.clone());
            }
            if let Some(result) = state.settlement() {
                return NextStep::Settle(id.clone(), result);
            }
        }
        NextStep::Done
    }

    pub fn summary(&self) -> SessionSummary {
        let mut summary = SessionSummary { total: self.run_list.len(), ..Default::default() };
        let mut seen = HashSet::new();
        for id in &self.run_list {
            if !seen.insert(id) {
                continue;
            }
            match self.job_state_map.get(id).map(|s| (s.status, s.outcome())) {
                Some((JobStatus::Finished, Outcome::Pass)) => summary.pass += 1,
                Some((JobStatus::Finished, Outcome::Fail)) => summary.fail += 1,
                Some((JobStatus::Finished, Outcome::Skip)) => summary.skip += 1,
                Some((JobStatus::Finished, Outcome::Crash)) => summary.crash += 1,
                Some((JobStatus::Finished, Outcome::NotSupported)) => summary.not_supported += 1,
                _ => summary.not_run += 1,
            }
        }
        summary
    }

    /// Job ids currently in `running` status. Never more than one.
    pub fn running_jobs(&self) -> Vec<&JobId> {
        self.job_state_map
            .iter()
            .filter(|(_, s)| s.status == JobStatus::Running)
            .map(|(id, _)| id)
            .collect()
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
