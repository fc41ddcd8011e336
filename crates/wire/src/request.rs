// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use cb_core::{JobId, Selection};
use cb_engine::Choice;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    /// Drives the session. The most recent controller holds the driver slot.
    Controller,
    /// Read-only.
    Observer,
}

/// Request from controller to agent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Request {
    /// Version handshake; must be the first frame on a connection
    Hello {
        version: String,
        role: Role,
        /// Stable per controller process, so a reconnect keeps the driver slot
        client_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
    },

    /// Health check ping
    Ping,

    ListTestPlans,

    StartSession {
        test_plan: String,
        #[serde(default)]
        selection: Selection,
    },

    GetNextJob,

    RunCurrentJob { job_id: JobId, choice: Choice },

    /// Rerun or keep a crashed job
    ResolveCrash { job_id: JobId, rerun: bool },

    /// Finished jobs the operator may run again once the flow is done
    GetRerunCandidates,

    /// Re-arm the given jobs and their failed dependencies
    PrepareRerun { job_ids: Vec<JobId> },

    GetSessionState,

    /// Stop the running job and halt the session
    CancelSession,

    /// Remove the completed session from the agent
    FinishSession,

    /// Turn the connection into a one-way stream of job events
    Subscribe,
}

impl Request {
    /// Requests only the driver may send.
    pub fn mutates(&self) -> bool {
        matches!(
            self,
            Request::StartSession { .. }
                | Request::RunCurrentJob { .. }
                | Request::ResolveCrash { .. }
                | Request::PrepareRerun { .. }
                | Request::CancelSession
                | Request::FinishSession
        )
    }
}
