// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use cb_core::test_support::{session_with, shell_job};
use cb_core::JobResult;

#[test]
fn status_lists_run_list_in_order() {
    let mut session = session_with(vec![shell_job("t::a", &[]), shell_job("t::b", &["t::a"])]);
    let a = JobId::new("t::a");
    session.begin(&a, 1).unwrap();
    session.transition(&a, Outcome::Fail, JobResult::default().with_comments("boom")).unwrap();

    let status = SessionStatus::from_session(&session);

    assert_eq!(status.session_id, SessionId::new("test-session"));
    let ids: Vec<_> = status.jobs.iter().map(|j| j.id.as_str()).collect();
    assert_eq!(ids, vec!["t::a", "t::b"]);
    assert_eq!(status.jobs[0].outcome, Outcome::Fail);
    assert_eq!(status.jobs[0].comments.as_deref(), Some("boom"));
    assert_eq!(status.jobs[1].status, JobStatus::NotStarted);
    assert_eq!(status.summary.fail, 1);
    assert!(!status.is_completed());
    assert!(status.flags.contains(&SessionFlag::Incomplete));
}

#[test]
fn running_job_is_reported() {
    let mut session = session_with(vec![shell_job("t::a", &[])]);
    session.begin(&JobId::new("t::a"), 1).unwrap();

    let status = SessionStatus::from_session(&session);

    assert_eq!(status.running_job, Some(JobId::new("t::a")));
    assert_eq!(status.jobs[0].status, JobStatus::Running);
}
