// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session requests: start, step, run, rerun, cancel, finish.

use cb_core::{JobId, Selection, SessionFlag, SystemClock};
use cb_engine::{Choice, Stage, Verb};
use cb_wire::Response;
use tracing::{info, warn};

use super::AgentCtx;
use crate::lifecycle::stage_deps;

fn no_session() -> Response {
    Response::error("no session; start one first")
}

pub(super) async fn handle_start(ctx: &AgentCtx, test_plan: &str, selection: Selection) -> Response {
    let mut slot = ctx.stage.lock().await;
    if let Some(stage) = slot.as_ref() {
        return Response::error(format!(
            "session {} is still open; finish it first",
            stage.session().id
        ));
    }

    let storage = match ctx.repo.create(test_plan, &SystemClock) {
        Ok(storage) => storage,
        Err(e) => return Response::error(e.to_string()),
    };
    let deps = stage_deps(&ctx.config, &ctx.providers, &ctx.runner);
    let stage = match Stage::start(storage, deps, test_plan, selection) {
        Ok(stage) => stage,
        Err(e) => return Response::error(e.to_string()),
    };
    let session_id = stage.session().id.clone();
    // Without the pointer a reboot would lose the session
    if let Err(e) = ctx.repo.set_pointer(&session_id) {
        if let Err(e) = stage.finish() {
            warn!(session_id = %session_id, error = %e, "failed to discard session");
        }
        return Response::error(e.to_string());
    }

    if let Some(error) = ctx.resume_error.lock().take() {
        warn!(session_id = %session_id, error = %error, "replaced a session that could not be resumed");
    }

    let response = Response::SessionStarted {
        session_id,
        run_list: stage.session().run_list.clone(),
        problems: stage.problems().iter().map(ToString::to_string).collect(),
    };
    ctx.adopt(&mut slot, stage);
    response
}

pub(super) async fn handle_next(ctx: &AgentCtx) -> Response {
    let mut slot = ctx.stage.lock().await;
    let Some(stage) = slot.as_mut() else {
        return no_session();
    };
    let response = match stage.next_job() {
        Ok(step) => Response::Next { step },
        Err(e) => Response::error(e.to_string()),
    };
    ctx.refresh(stage);
    response
}

pub(super) async fn handle_run(ctx: &AgentCtx, job_id: &JobId, choice: Choice) -> Response {
    let mut slot = ctx.stage.lock().await;
    let Some(stage) = slot.as_mut() else {
        return no_session();
    };
    if choice.verb == Verb::Run {
        if let Some(status) = ctx.status.lock().as_mut() {
            status.running_job = Some(job_id.clone());
        }
    }
    let response = match stage.run_current_job(job_id, choice).await {
        Ok(outcome) => Response::JobOutcome { outcome },
        Err(e) => Response::error(e.to_string()),
    };
    ctx.refresh(stage);
    response
}

pub(super) async fn handle_resolve_crash(ctx: &AgentCtx, job_id: &JobId, rerun: bool) -> Response {
    let mut slot = ctx.stage.lock().await;
    let Some(stage) = slot.as_mut() else {
        return no_session();
    };
    let response = match stage.resolve_crash(job_id, rerun) {
        Ok(()) => Response::Ok,
        Err(e) => Response::error(e.to_string()),
    };
    ctx.refresh(stage);
    response
}

pub(super) async fn handle_rerun_candidates(ctx: &AgentCtx) -> Response {
    let slot = ctx.stage.lock().await;
    let Some(stage) = slot.as_ref() else {
        return no_session();
    };
    let session = stage.session();
    let jobs = stage.rerun_candidates().iter().filter_map(|id| session.job(id).cloned()).collect();
    Response::RerunCandidates { jobs }
}

pub(super) async fn handle_prepare_rerun(ctx: &AgentCtx, job_ids: &[JobId]) -> Response {
    let mut slot = ctx.stage.lock().await;
    let Some(stage) = slot.as_mut() else {
        return no_session();
    };
    let response = match stage.prepare_rerun(job_ids) {
        Ok(job_ids) => Response::RerunPrepared { job_ids },
        Err(e) => Response::error(e.to_string()),
    };
    ctx.refresh(stage);
    response
}

/// Stop the running job, if any, and halt the session.
pub(super) fn handle_cancel(ctx: &AgentCtx) -> Response {
    match ctx.cancel.lock().as_ref() {
        Some(handle) => {
            handle.cancel();
            info!(session_id = ?ctx.session_id(), "session cancelled");
            Response::Ok
        }
        None => no_session(),
    }
}

/// Remove a completed or cancelled session.
pub(super) async fn handle_finish(ctx: &AgentCtx) -> Response {
    let mut slot = ctx.stage.lock().await;
    let Some(stage) = slot.as_ref() else {
        return no_session();
    };
    let session = stage.session();
    if session.has_flag(SessionFlag::Incomplete) && !session.has_flag(SessionFlag::Cancelled) {
        return Response::error(format!("session {} is not complete; cancel it first", session.id));
    }

    let Some(stage) = slot.take() else {
        return no_session();
    };
    ctx.forget(&mut slot);
    let session_id = stage.session().id.clone();
    match stage.finish() {
        Ok(summary) => {
            ctx.repo.clear_pointer();
            info!(session_id = %session_id, "session finished");
            Response::SessionFinished { summary }
        }
        Err(e) => Response::error(e.to_string()),
    }
}
