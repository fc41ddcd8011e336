// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `cb run` - run a test plan on this machine, prompting on the terminal

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use cb_core::{SessionId, SystemClock};
use cb_engine::{
    ProcessRunner, SessionControl, Stage, StageConfig, StageDeps, StageError, StageEvent,
};
use cb_plan::ResolveError;
use cb_storage::{SessionRepository, StorageError};
use clap::Args;
use tokio::sync::broadcast;

use super::{load_providers, SelectionArgs};
use crate::color;
use crate::exit_error::ExitError;
use crate::interaction::TerminalInteraction;
use crate::output::{print_event, print_json, print_problems, print_summary, OutputFormat};

const KILL_GRACE: Duration = Duration::from_secs(5);

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Test plan id
    #[arg(required_unless_present = "resume")]
    pub plan: Option<String>,

    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Continue a quit or interrupted session instead of starting one
    #[arg(long, value_name = "SESSION", conflicts_with = "plan")]
    pub resume: Option<String>,

    /// Keep the session on disk after it completes
    #[arg(long)]
    pub keep: bool,

    /// Take the prompt's default after this many seconds without an answer
    #[arg(long, env = "CB_PROMPT_TIMEOUT_SECS", value_name = "SECS")]
    pub prompt_timeout_secs: Option<u64>,

    /// Timeout for jobs that do not set their own
    #[arg(long, env = "CB_JOB_TIMEOUT_SECS", value_name = "SECS")]
    pub job_timeout_secs: Option<u64>,

    /// Most runs of one job, crash reruns included
    #[arg(long, env = "CB_MAX_ATTEMPTS", default_value_t = 3)]
    pub max_attempts: u32,

    /// Rerun failed jobs when the plan ends, up to the attempt cap
    #[arg(long, env = "CB_AUTO_RETRY")]
    pub auto_retry: bool,
}

impl RunArgs {
    fn stage_config(&self) -> StageConfig {
        let mut config = StageConfig::default().max_attempts(self.max_attempts.max(1)).auto_retry(self.auto_retry);
        config.prompt_timeout = self.prompt_timeout_secs.map(Duration::from_secs);
        config.default_timeout = self.job_timeout_secs.map(Duration::from_secs);
        config
    }
}

pub async fn handle(args: RunArgs, state_dir: &Path, format: OutputFormat) -> Result<()> {
    let providers = Arc::new(load_providers(state_dir)?);
    let repo = SessionRepository::new(state_dir);
    let deps = StageDeps {
        providers: Arc::clone(&providers),
        runner: Arc::new(ProcessRunner::new(KILL_GRACE)),
        clock: SystemClock,
        config: args.stage_config(),
    };

    let mut stage = match (&args.resume, &args.plan) {
        (Some(id), _) => {
            let resumed = repo
                .open(&SessionId::new(id.as_str()))
                .map_err(StageError::from)
                .and_then(|storage| Stage::resume(storage, deps));
            match resumed {
                Ok(stage) => stage,
                Err(e @ StageError::Storage(StorageError::Corrupt { .. })) => {
                    return Err(ExitError::internal(format!(
                        "{e}\nstart a fresh session with `cb run <plan>`, or delete it with `cb session remove {id}`"
                    ))
                    .into());
                }
                Err(e) => return Err(internal(e)),
            }
        }
        (None, Some(plan)) => {
            let storage = repo.create(plan, &SystemClock).map_err(internal)?;
            match Stage::start(storage, deps, plan, args.selection.clone().into_selection()) {
                Ok(stage) => stage,
                Err(StageError::Resolve(ResolveError::Empty { problems })) => {
                    print_problems(&problems);
                    return Err(ExitError::internal(format!("{plan}: selection resolved to no jobs")).into());
                }
                Err(e) => return Err(internal(e)),
            }
        }
        (None, None) => return Err(ExitError::internal("a test plan or --resume is required").into()),
    };
    print_problems(stage.problems());

    let session_id = stage.session().id.clone();
    eprintln!("{} {}", color::header(&stage.session().title), color::muted(session_id.as_str()));

    let printer = tokio::spawn(print_events(stage.subscribe()));
    let cancel = stage.cancel_handle();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nCancelling...");
            cancel.cancel();
        }
    });

    let mut ui = TerminalInteraction::stdin();
    let result = stage.run_all(&mut ui).await;
    interrupt.abort();

    let (completed, summary) = match result {
        Ok((SessionControl::Continue, summary)) => {
            if args.keep {
                drop(stage);
            } else {
                stage.finish().map_err(internal)?;
            }
            (true, summary)
        }
        Ok((SessionControl::Cancel, summary)) => {
            drop(stage);
            eprintln!("Session stopped; resume with `cb run --resume {session_id}`");
            (false, summary)
        }
        Err(e) => {
            drop(stage);
            let _ = printer.await;
            return Err(internal(e));
        }
    };
    // Every sender is gone once the stage drops, so the printer drains and ends
    let _ = printer.await;

    match format {
        OutputFormat::Text => print_summary(&summary, format)?,
        OutputFormat::Json => print_json(&serde_json::json!({
            "session_id": session_id,
            "completed": completed,
            "summary": summary,
        }))?,
    }
    if summary.has_failures() {
        return Err(ExitError::failures("one or more jobs failed or crashed").into());
    }
    Ok(())
}

async fn print_events(mut events: broadcast::Receiver<StageEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => print_event(&event),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(skipped = n, "output fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn internal(e: impl std::fmt::Display) -> anyhow::Error {
    ExitError::internal(e.to_string()).into()
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
