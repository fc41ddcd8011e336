// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job definitions.
//!
//! A [`Job`] is immutable once loaded from a provider. All run-time state
//! lives in [`crate::session::JobState`].

use crate::expr::{ExprError, Requirement};
use crate::id::JobId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How a job is executed and whether an operator is involved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    /// Automated command; outcome from exit code.
    Shell,
    /// Automated command whose stdout is parsed into resource records.
    Resource,
    /// Automated command whose stdout is kept as an attachment.
    Attachment,
    /// Operator confirms before the command runs.
    UserInteract,
    /// Command runs, then the operator decides the outcome.
    UserVerify,
    /// Operator confirms, command runs, operator decides the outcome.
    UserInteractVerify,
    /// No command; the operator performs the test and decides the outcome.
    Manual,
}

impl JobKind {
    /// Whether the operator is prompted before anything runs.
    pub fn prompts_before_run(self) -> bool {
        matches!(self, JobKind::UserInteract | JobKind::UserInteractVerify | JobKind::Manual)
    }

    /// Whether the outcome is decided by the operator rather than the exit code.
    pub fn operator_verdict(self) -> bool {
        matches!(self, JobKind::UserVerify | JobKind::UserInteractVerify | JobKind::Manual)
    }

    pub fn is_interactive(self) -> bool {
        self.prompts_before_run() || self.operator_verdict()
    }
}

crate::simple_display! {
    JobKind {
        Shell => "shell",
        Resource => "resource",
        Attachment => "attachment",
        UserInteract => "user-interact",
        UserVerify => "user-verify",
        UserInteractVerify => "user-interact-verify",
        Manual => "manual",
    }
}

/// How much a job's result matters to certification.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum CertificationStatus {
    #[default]
    Unspecified,
    NotPartOf,
    NonBlocker,
    Blocker,
}

crate::simple_display! {
    CertificationStatus {
        Unspecified => "unspecified",
        NotPartOf => "not-part-of",
        NonBlocker => "non-blocker",
        Blocker => "blocker",
    }
}

/// A unit of test work contributed by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Jobs that must finish with `pass` first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends: Vec<JobId>,
    /// Ordering-only hints, honoured between selected jobs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub after: Vec<JobId>,
    /// Resource expressions, one per line, all of which must hold.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<String>,
    /// Alias -> resource job id, for expressions that name a foreign resource.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub imports: BTreeMap<String, JobId>,
    /// Seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_duration: Option<f64>,
    /// Hard run timeout in seconds, overriding the stage default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    /// Run-as user; `root` keeps the agent's privileges.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Agent environment variables passed through to the command.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environ: Vec<String>,
    #[serde(default)]
    pub certification_status: CertificationStatus,
    /// Set on jobs instantiated from a template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    /// Provider file the job was loaded from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

impl Job {
    pub fn new(id: impl Into<JobId>, kind: JobKind) -> Self {
        Self {
            id: id.into(),
            kind,
            command: None,
            summary: String::new(),
            category: None,
            depends: Vec::new(),
            after: Vec::new(),
            requires: Vec::new(),
            imports: BTreeMap::new(),
            estimated_duration: None,
            timeout: None,
            user: None,
            environ: Vec::new(),
            certification_status: CertificationStatus::Unspecified,
            template_id: None,
            origin: None,
        }
    }

    /// Namespace used to qualify partial references made by this job.
    pub fn namespace(&self) -> &str {
        self.id.namespace().unwrap_or_default()
    }

    /// Parse every `requires` line.
    pub fn requirements(&self) -> Result<Vec<Requirement>, ExprError> {
        self.requires.iter().map(|line| Requirement::parse(line)).collect()
    }

    /// Job id of the resource an expression refers to.
    pub fn resource_job_id(&self, requirement: &Requirement) -> JobId {
        match self.imports.get(requirement.resource()) {
            Some(id) => id.clone(),
            None => JobId::qualified(self.namespace(), requirement.resource()),
        }
    }

    /// Resource jobs referenced by `requires`, deduplicated, in first-use order.
    pub fn resource_dependencies(&self) -> Result<Vec<JobId>, ExprError> {
        let mut ids = Vec::new();
        for req in self.requirements()? {
            let id = self.resource_job_id(&req);
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    /// `depends` plus resource dependencies. Unparseable requirements are skipped.
    pub fn hard_dependencies(&self) -> Vec<JobId> {
        let mut ids = self.depends.clone();
        for id in self.resource_dependencies().unwrap_or_default() {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }
}

crate::builder! {
    pub struct JobBuilder => Job {
        into {
            id: JobId = "test::job",
            summary: String = "",
        }
        set {
            kind: JobKind = JobKind::Shell,
            depends: Vec<JobId> = Vec::new(),
            after: Vec<JobId> = Vec::new(),
            requires: Vec<String> = Vec::new(),
            imports: BTreeMap<String, JobId> = BTreeMap::new(),
            environ: Vec<String> = Vec::new(),
            certification_status: CertificationStatus = CertificationStatus::Unspecified,
        }
        option {
            command: String = Some("true".to_string()),
            category: String = None,
            estimated_duration: f64 = None,
            timeout: u64 = None,
            user: String = None,
            template_id: String = None,
            origin: String = None,
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
