// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use crate::{Job, JobId, JobKind, Session, SessionId};

// ── Proptest strategies ─────────────────────────────────────────────────

/// Proptest strategies for core state machine types.
pub mod strategies {
    use crate::Outcome;
    use proptest::prelude::*;

    pub fn arb_terminal_outcome() -> impl Strategy<Value = Outcome> {
        prop_oneof![
            Just(Outcome::Pass),
            Just(Outcome::Fail),
            Just(Outcome::Skip),
            Just(Outcome::Crash),
            Just(Outcome::NotSupported),
        ]
    }

    /// Random DAG as `(job index, dependency indices)`; dependencies always
    /// point at lower indices so the graph is acyclic.
    pub fn arb_dag(max_jobs: usize) -> impl Strategy<Value = Vec<Vec<usize>>> {
        (1..=max_jobs).prop_flat_map(|n| {
            (0..n)
                .map(|i| {
                    if i == 0 {
                        Just(Vec::new()).boxed()
                    } else {
                        proptest::collection::vec(0..i, 0..=i.min(3))
                            .prop_map(|mut deps| {
                                deps.sort_unstable();
                                deps.dedup();
                                deps
                            })
                            .boxed()
                    }
                })
                .collect::<Vec<_>>()
        })
    }
}

// ── Factories ───────────────────────────────────────────────────────────────

pub fn shell_job(id: &str, depends: &[&str]) -> Job {
    Job::builder().id(id).depends(depends.iter().map(|d| JobId::new(*d)).collect()).build()
}

pub fn resource_job(id: &str) -> Job {
    Job::builder().id(id).kind(JobKind::Resource).build()
}

/// Session whose run list is `jobs` in the given order, all desired.
pub fn session_with(jobs: Vec<Job>) -> Session {
    let ids: Vec<JobId> = jobs.iter().map(|j| j.id.clone()).collect();
    let mut session = Session::new(SessionId::new("test-session"), "test", 1_000_000);
    session.update_run_list(jobs, ids.clone(), ids);
    session
}
