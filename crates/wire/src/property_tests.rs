// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Property tests for protocol serde roundtrips.
//!
//! Covers every variant of Request and Response with minimal fixed field
//! values, plus job results carrying arbitrary terminal outcomes.

use cb_core::test_support::strategies::arb_terminal_outcome;
use cb_core::test_support::{session_with, shell_job};
use cb_core::{JobId, JobResult, SessionId, SessionSummary};
use cb_engine::{Choice, IoLine, Prompt, StageEvent, Step, StepOutcome, Stream, Verb};
use proptest::prelude::*;

use super::*;

fn s() -> String {
    String::new()
}

fn id() -> JobId {
    JobId::new("t::a")
}

fn status() -> Box<SessionStatus> {
    Box::new(SessionStatus::from_session(&session_with(vec![shell_job("t::a", &[])])))
}

fn all_requests() -> Vec<Request> {
    vec![
        Request::Hello { version: s(), role: Role::Controller, client_id: s(), token: None },
        Request::Hello { version: s(), role: Role::Observer, client_id: s(), token: Some(s()) },
        Request::Ping,
        Request::ListTestPlans,
        Request::StartSession { test_plan: s(), selection: Default::default() },
        Request::GetNextJob,
        Request::RunCurrentJob { job_id: id(), choice: Choice::new(Verb::Run) },
        Request::RunCurrentJob { job_id: id(), choice: Choice::with_comment(Verb::Skip, "why") },
        Request::ResolveCrash { job_id: id(), rerun: true },
        Request::GetRerunCandidates,
        Request::PrepareRerun { job_ids: vec![id()] },
        Request::GetSessionState,
        Request::CancelSession,
        Request::FinishSession,
        Request::Subscribe,
    ]
}

fn all_responses() -> Vec<Response> {
    vec![
        Response::Ok,
        Response::Pong,
        Response::Hello { version: s(), driver: true, session: None, resume_error: None },
        Response::Hello { version: s(), driver: false, session: Some(status()), resume_error: Some(s()) },
        Response::TestPlans { plans: vec![PlanEntry { id: s(), name: s() }] },
        Response::SessionStarted {
            session_id: SessionId::new("s"),
            run_list: vec![id()],
            problems: vec![s()],
        },
        Response::Next { step: Step::Prompt(Prompt::start(shell_job("t::a", &[]))) },
        Response::Next { step: Step::CrashPending { job: id(), attempts: 1, can_rerun: true } },
        Response::Next { step: Step::Done(SessionSummary::default()) },
        Response::JobOutcome { outcome: StepOutcome::Quit },
        Response::SessionState { state: None, resume_error: Some(s()) },
        Response::SessionState { state: Some(status()), resume_error: None },
        Response::RerunCandidates { jobs: vec![shell_job("t::a", &[])] },
        Response::RerunPrepared { job_ids: vec![id()] },
        Response::SessionFinished { summary: SessionSummary::default() },
        Response::Event { event: StageEvent::JobStarted { job_id: id() } },
        Response::Event {
            event: StageEvent::Io {
                job_id: id(),
                line: IoLine { elapsed_secs: 0.5, stream: Stream::Stderr, line: s() },
            },
        },
        Response::error("boom"),
    ]
}

proptest! {
    #[test]
    fn request_serde_roundtrip(req in proptest::sample::select(all_requests())) {
        let encoded = encode(&req).expect("encode failed");
        let decoded: Request = decode(&encoded).expect("decode failed");
        prop_assert_eq!(decoded, req);
    }

    #[test]
    fn response_serde_roundtrip(resp in proptest::sample::select(all_responses())) {
        let encoded = encode(&resp).expect("encode failed");
        let decoded: Response = decode(&encoded).expect("decode failed");
        prop_assert_eq!(decoded, resp);
    }

    #[test]
    fn job_outcome_roundtrip(outcome in arb_terminal_outcome(), comments in "[ -~]{0,40}") {
        let result = JobResult::new(outcome).with_comments(comments);
        let resp = Response::JobOutcome {
            outcome: StepOutcome::Finished { job: id(), result },
        };
        let decoded: Response = decode(&encode(&resp).expect("encode failed")).expect("decode failed");
        prop_assert_eq!(decoded, resp);
    }
}
