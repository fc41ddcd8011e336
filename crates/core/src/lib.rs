// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! cb-core: job model, resource expressions and the session state machine

pub mod macros;

pub mod clock;
pub mod expr;
pub mod id;
pub mod job;
pub mod outcome;
pub mod resource;
pub mod selection;
pub mod session;
pub mod time_fmt;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use clock::{Clock, FakeClock, SystemClock};
pub use expr::{ExprError, Requirement};
pub use id::{short, JobId, SessionId, NAMESPACE_SEP};
#[cfg(any(test, feature = "test-support"))]
pub use job::JobBuilder;
pub use job::{CertificationStatus, Job, JobKind};
pub use outcome::{JobResult, JobStatus, Outcome, ResumeMarker};
pub use resource::{parse_records, render_records, ParsedResources, ResourceRecord};
pub use selection::Selection;
pub use session::{
    Inhibitor, InhibitorCause, JobState, NextStep, RerunKind, Session, SessionError, SessionFlag,
    SessionMetadata, SessionSummary,
};
pub use time_fmt::format_elapsed_ms;
