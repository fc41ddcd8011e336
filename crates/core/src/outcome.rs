// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job outcomes and results.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Result of a single job attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    #[default]
    Undecided,
    Pass,
    Fail,
    Skip,
    Crash,
    NotSupported,
}

impl Outcome {
    pub fn is_decided(self) -> bool {
        self != Outcome::Undecided
    }

    /// Outcomes that make the run as a whole unsuccessful.
    pub fn is_failure(self) -> bool {
        matches!(self, Outcome::Fail | Outcome::Crash)
    }
}

crate::simple_display! {
    Outcome {
        Undecided => "undecided",
        Pass => "pass",
        Fail => "fail",
        Skip => "skip",
        Crash => "crash",
        NotSupported => "not-supported",
    }
}

/// Lifecycle position of a job within a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    #[default]
    NotStarted,
    Running,
    Finished,
}

crate::simple_display! {
    JobStatus {
        NotStarted => "not-started",
        Running => "running",
        Finished => "finished",
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_code: Option<i32>,
    /// Path of the captured IO log, relative to the session directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub io_log: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl JobResult {
    pub fn new(outcome: Outcome) -> Self {
        Self { outcome, ..Self::default() }
    }

    pub fn with_comments(mut self, comments: impl Into<String>) -> Self {
        self.comments = Some(comments.into());
        self
    }

    pub fn with_return_code(mut self, code: i32) -> Self {
        self.return_code = Some(code);
        self
    }
}

/// Outcome a job records for itself before it deliberately reboots the DUT.
///
/// Stored as JSON in `session-share/__result`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeMarker {
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
}

#[cfg(test)]
#[path = "outcome_tests.rs"]
mod tests;
