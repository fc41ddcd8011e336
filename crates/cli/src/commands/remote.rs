// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `cb remote` - drive a session on an agent over the network

use std::time::Duration;

use anyhow::Result;
use clap::Args;

use super::SelectionArgs;
use crate::client::{agent_addr, AgentClient, ClientConfig, ClientError, ReconnectPolicy};
use crate::color;
use crate::controller::{cancel_session, Attached, Controller, RemoteEnd};
use crate::exit_error::ExitError;
use crate::interaction::TerminalInteraction;
use crate::output::{print_json, print_problems, print_summary, OutputFormat};

#[derive(Args, Debug)]
pub struct RemoteArgs {
    /// Agent host, optionally with `:port`
    pub host: String,

    /// Test plan to start when the agent has no open session
    pub plan: Option<String>,

    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Shared secret the agent was started with
    #[arg(long, env = "CB_AUTH_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Leave the completed session on the agent
    #[arg(long)]
    pub keep: bool,

    /// Take the prompt's default after this many seconds without an answer
    #[arg(long, env = "CB_PROMPT_TIMEOUT_SECS", value_name = "SECS")]
    pub prompt_timeout_secs: Option<u64>,

    /// Start the plan without asking when the agent lost its last session
    #[arg(long)]
    pub fresh: bool,

    /// Connection attempts before giving up on the agent
    #[arg(long, env = "CB_RECONNECT_ATTEMPTS", default_value_t = 30)]
    pub reconnect_attempts: u32,

    /// Longest pause between connection attempts
    #[arg(long, env = "CB_RECONNECT_MAX_BACKOFF_MS", value_name = "MS", default_value_t = 8000)]
    pub max_backoff_ms: u64,
}

impl RemoteArgs {
    fn client_config(&self) -> ClientConfig {
        let defaults = ReconnectPolicy::default();
        let max = Duration::from_millis(self.max_backoff_ms).max(defaults.initial);
        ClientConfig {
            token: self.token.clone(),
            reconnect: ReconnectPolicy { attempts: self.reconnect_attempts.max(1), max, ..defaults },
            ..ClientConfig::new(agent_addr(&self.host))
        }
    }
}

pub async fn handle(args: RemoteArgs, format: OutputFormat) -> Result<()> {
    let mut client = AgentClient::new(args.client_config());
    let greeting = client.connect().await.map_err(transport)?;
    tracing::debug!(version = %greeting.version, driver = greeting.driver, "connected to agent");
    if !greeting.driver {
        return Err(ExitError::internal(cb_wire::NOT_DRIVER).into());
    }

    let mut ui = TerminalInteraction::stdin();
    if let Some(error) = greeting.resume_error.as_deref() {
        if greeting.session.is_none() {
            confirm_fresh_start(&mut ui, error, &args).await?;
        }
    }

    let config = client.config().clone();
    let client_id = client.client_id().to_string();
    let interrupt = tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nCancelling...");
            if let Err(e) = cancel_session(&config, &client_id).await {
                eprintln!("cancel failed: {e}");
            }
        }
    });

    let prompt_timeout = args.prompt_timeout_secs.map(Duration::from_secs);
    let mut controller = Controller::new(client, ui, prompt_timeout);
    let result = run_session(&mut controller, &args).await;
    interrupt.abort();
    let (done, summary) = result?;

    match format {
        OutputFormat::Text => print_summary(&summary, format)?,
        OutputFormat::Json => print_json(&serde_json::json!({ "completed": done, "summary": summary }))?,
    }
    if summary.has_failures() {
        return Err(ExitError::failures("one or more jobs failed or crashed").into());
    }
    Ok(())
}

/// The agent could not reopen the session it was running. Starting a new
/// one replaces it, so the operator has to agree first.
async fn confirm_fresh_start<R>(ui: &mut TerminalInteraction<R>, error: &str, args: &RemoteArgs) -> Result<()>
where
    R: tokio::io::AsyncRead + Unpin + Send,
{
    eprintln!("{} the agent could not resume its last session: {error}", color::header("warning:"));
    let Some(plan) = args.plan.as_deref() else {
        return Ok(());
    };
    if args.fresh || ui.confirm(&format!("Start a new session from {plan} instead?")).await {
        return Ok(());
    }
    Err(ExitError::internal("left the unresumable session in place; pass --fresh to replace it").into())
}

async fn run_session(
    controller: &mut Controller<TerminalInteraction<tokio::io::Stdin>>,
    args: &RemoteArgs,
) -> Result<(bool, cb_core::SessionSummary)> {
    let selection = args.selection.clone().into_selection();
    match controller.attach(args.plan.as_deref(), &selection).await.map_err(transport)? {
        Attached::NoSession => {
            return Err(ExitError::internal("the agent has no open session; name a test plan to start one").into())
        }
        Attached::Resumed(status) => {
            eprintln!(
                "Resuming {} {}",
                color::header(&status.title),
                color::muted(status.session_id.as_str())
            );
            if args.plan.as_deref().is_some_and(|plan| status.test_plan.as_deref() != Some(plan)) {
                eprintln!("warning: the agent's open session was not started from the given plan");
            }
        }
        Attached::Started { session_id, run_list, problems } => {
            print_problems(&problems);
            eprintln!(
                "Started {} {}",
                color::muted(session_id.as_str()),
                color::context(&format!("({} jobs)", run_list.len()))
            );
        }
    }

    match controller.drive().await.map_err(transport)? {
        RemoteEnd::Done(summary) => {
            if !args.keep {
                controller.finish().await.map_err(transport)?;
            }
            Ok((true, summary))
        }
        RemoteEnd::Quit(summary) => {
            eprintln!("Session left open on the agent; run `cb remote {}` to continue", args.host);
            Ok((false, summary))
        }
    }
}

fn transport(e: ClientError) -> anyhow::Error {
    ExitError::internal(e.to_string()).into()
}

#[cfg(test)]
#[path = "remote_tests.rs"]
mod tests;
