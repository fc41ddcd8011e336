// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! cb-engine: the execution loop, job runner and IO logs

pub mod interaction;
pub mod io_log;
pub mod runner;
pub mod stage;

pub use interaction::{
    Choice, CrashDecision, Interaction, Prompt, PromptPhase, SessionControl, Verb,
};
pub use io_log::{read_io_log, IoLine, IoLogWriter, Stream};
pub use runner::{Exit, JobRunner, ProcessRunner, RunError, RunOutput, RunSpec};
pub use stage::{
    CancelHandle, Stage, StageConfig, StageDeps, StageError, StageEvent, Step, StepOutcome,
};
