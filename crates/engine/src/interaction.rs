// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operator interaction: prompts, choices and the verbs they carry.

use async_trait::async_trait;
use cb_core::{Job, JobId, JobKind, JobResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Verb {
    Run,
    Skip,
    /// Skip with a mandatory comment.
    Comment,
    Pass,
    Fail,
    /// End the whole session; it stays resumable.
    Quit,
}

cb_core::simple_display! {
    Verb {
        Run => "run",
        Skip => "skip",
        Comment => "comment",
        Pass => "pass",
        Fail => "fail",
        Quit => "quit",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub verb: Verb,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl Choice {
    pub fn new(verb: Verb) -> Self {
        Self { verb, comment: None }
    }

    pub fn with_comment(verb: Verb, comment: impl Into<String>) -> Self {
        Self { verb, comment: Some(comment.into()) }
    }

    /// Comment text, if any non-blank text was given.
    pub fn comment_text(&self) -> Option<&str> {
        self.comment.as_deref().map(str::trim).filter(|c| !c.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PromptPhase {
    /// Before the job runs.
    Start,
    /// After the command ran; the operator judges the result.
    Verdict,
}

/// What the operator is asked about the next job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    pub job: Job,
    pub phase: PromptPhase,
    /// False for automated jobs; callers answer `run` without asking.
    pub interactive: bool,
    pub choices: Vec<Verb>,
    /// Applied when the prompt times out.
    pub default: Verb,
    /// Return code and log of the run being judged, in the verdict phase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
}

impl Prompt {
    pub fn start(job: Job) -> Self {
        let (interactive, choices) = match job.kind {
            JobKind::Manual => (true, vec![Verb::Pass, Verb::Fail, Verb::Skip, Verb::Comment, Verb::Quit]),
            kind => (kind.prompts_before_run(), vec![Verb::Run, Verb::Skip, Verb::Comment, Verb::Quit]),
        };
        Self { job, phase: PromptPhase::Start, interactive, choices, default: Verb::Skip, result: None }
    }

    pub fn verdict(job: Job, result: JobResult) -> Self {
        Self {
            job,
            phase: PromptPhase::Verdict,
            interactive: true,
            choices: vec![Verb::Pass, Verb::Fail, Verb::Skip, Verb::Comment, Verb::Quit],
            default: Verb::Skip,
            result: Some(result),
        }
    }

    pub fn allows(&self, verb: Verb) -> bool {
        self.choices.contains(&verb)
    }
}

/// `quit` is a value, not an unwinding error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionControl {
    Continue,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CrashDecision {
    Rerun,
    Keep,
}

/// Source of operator decisions for [`crate::Stage::run_all`].
#[async_trait]
pub trait Interaction: Send {
    async fn choose(&mut self, prompt: &Prompt) -> Choice;

    async fn decide_crash(&mut self, job: &JobId, attempts: u32, can_rerun: bool) -> CrashDecision;

    /// Pick jobs to run again once every job was attempted. None by default.
    async fn choose_reruns(&mut self, _candidates: &[Job]) -> Vec<JobId> {
        Vec::new()
    }

    /// The last choice was refused; the prompt will be shown again.
    fn rejected(&mut self, _prompt: &Prompt, _reason: &str) {}

    fn finished(&mut self, _job: &Job, _result: &JobResult) {}
}

#[cfg(test)]
#[path = "interaction_tests.rs"]
mod tests;
