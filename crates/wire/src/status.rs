// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session overview types for the protocol.

use cb_core::{JobId, JobKind, JobStatus, Outcome, Session, SessionFlag, SessionId, SessionSummary};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobStatusEntry {
    pub id: JobId,
    pub kind: JobKind,
    pub status: JobStatus,
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionStatus {
    pub session_id: SessionId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_plan: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub running_job: Option<JobId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_crash: Option<JobId>,
    pub flags: Vec<SessionFlag>,
    pub summary: SessionSummary,
    /// Run-list jobs, in run order
    pub jobs: Vec<JobStatusEntry>,
    /// A job was executing when this was taken; details may be stale
    #[serde(default)]
    pub busy: bool,
}

impl SessionStatus {
    pub fn from_session(session: &Session) -> Self {
        let jobs = session
            .run_list
            .iter()
            .filter_map(|id| {
                let job = session.job(id)?;
                let state = session.state(id)?;
                Some(JobStatusEntry {
                    id: id.clone(),
                    kind: job.kind,
                    status: state.status,
                    outcome: state.outcome(),
                    comments: state.result.comments.clone(),
                })
            })
            .collect();
        Self {
            session_id: session.id.clone(),
            title: session.title.clone(),
            test_plan: session.metadata.test_plan.clone(),
            running_job: session.running_job().cloned(),
            pending_crash: session.metadata.pending_crash.clone(),
            flags: session.metadata.flags.iter().copied().collect(),
            summary: session.summary(),
            jobs,
            busy: false,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.flags.contains(&SessionFlag::FlowCompleted)
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
