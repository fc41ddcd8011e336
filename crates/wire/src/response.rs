// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use cb_core::{Job, JobId, SessionId, SessionSummary};
use cb_engine::{StageEvent, Step, StepOutcome};
use serde::{Deserialize, Serialize};

use super::SessionStatus;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanEntry {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// Response from agent to controller
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Response {
    /// Generic success
    Ok,

    /// Health check response
    Pong,

    /// Version handshake response
    Hello {
        version: String,
        /// Whether this connection now holds the driver slot
        driver: bool,
        /// The agent's current session, if any
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session: Option<Box<SessionStatus>>,
        /// Why the agent could not resume its last session
        #[serde(default, skip_serializing_if = "Option::is_none")]
        resume_error: Option<String>,
    },

    TestPlans { plans: Vec<PlanEntry> },

    SessionStarted {
        session_id: SessionId,
        run_list: Vec<JobId>,
        #[serde(default)]
        problems: Vec<String>,
    },

    Next { step: Step },

    JobOutcome { outcome: StepOutcome },

    SessionState {
        state: Option<Box<SessionStatus>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        resume_error: Option<String>,
    },

    RerunCandidates { jobs: Vec<Job> },

    /// The re-armed jobs in run order
    RerunPrepared { job_ids: Vec<JobId> },

    SessionFinished { summary: SessionSummary },

    /// One frame of a subscribed event stream
    Event { event: StageEvent },

    Error { message: String },
}

impl Response {
    pub fn error(message: impl Into<String>) -> Self {
        Response::Error { message: message.into() }
    }
}
