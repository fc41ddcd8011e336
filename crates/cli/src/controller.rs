// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Driving an agent's session from the controller side.

use std::time::Duration;

use cb_core::{JobId, Selection, SessionSummary};
use cb_engine::{Choice, CrashDecision, Interaction, Prompt, PromptPhase, Step, StepOutcome, Verb};
use cb_wire::{read_frame, write_frame, Request, Response, Role, SessionStatus};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use crate::client::{reject, AgentClient, ClientConfig, ClientError};
use crate::output;

/// How the controller got hold of a session.
#[derive(Debug, Clone, PartialEq)]
pub enum Attached {
    Resumed(SessionStatus),
    Started { session_id: cb_core::SessionId, run_list: Vec<JobId>, problems: Vec<String> },
    /// The agent has no session and no test plan was given.
    NoSession,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RemoteEnd {
    /// Every job was attempted.
    Done(SessionSummary),
    /// The operator quit; the session stays open on the agent.
    Quit(SessionSummary),
}

pub struct Controller<I> {
    client: AgentClient,
    ui: I,
    prompt_timeout: Option<Duration>,
    printer: Option<JoinHandle<()>>,
}

impl<I: Interaction> Controller<I> {
    pub fn new(client: AgentClient, ui: I, prompt_timeout: Option<Duration>) -> Self {
        Self { client, ui, prompt_timeout, printer: None }
    }

    pub fn client(&self) -> &AgentClient {
        &self.client
    }

    /// Resume the agent's open session, or start `plan` when there is none.
    pub async fn attach(&mut self, plan: Option<&str>, selection: &Selection) -> Result<Attached, ClientError> {
        loop {
            match self.try_attach(plan, selection).await {
                Err(ClientError::Reconnected) => continue,
                other => return other,
            }
        }
    }

    async fn try_attach(&mut self, plan: Option<&str>, selection: &Selection) -> Result<Attached, ClientError> {
        match self.client.call(&Request::GetSessionState).await? {
            Response::SessionState { state: Some(status), .. } => return Ok(Attached::Resumed(*status)),
            Response::SessionState { state: None, .. } => {}
            other => return reject(other),
        }
        let Some(plan) = plan else {
            return Ok(Attached::NoSession);
        };
        let request = Request::StartSession { test_plan: plan.to_string(), selection: selection.clone() };
        match self.client.call(&request).await? {
            Response::SessionStarted { session_id, run_list, problems } => {
                Ok(Attached::Started { session_id, run_list, problems })
            }
            other => reject(other),
        }
    }

    /// Drive the session until every job was attempted or the operator quits.
    pub async fn drive(&mut self) -> Result<RemoteEnd, ClientError> {
        self.restart_printer().await;
        loop {
            let step = match self.client.call(&Request::GetNextJob).await {
                Ok(Response::Next { step }) => step,
                Ok(other) => return reject(other),
                Err(ClientError::Reconnected) => {
                    self.catch_up().await?;
                    continue;
                }
                Err(e) => return Err(e),
            };
            match step {
                Step::Done(summary) => {
                    if self.offer_reruns().await? {
                        continue;
                    }
                    return Ok(RemoteEnd::Done(summary));
                }
                Step::CrashPending { job, attempts, can_rerun } => {
                    let decision = self.ui.decide_crash(&job, attempts, can_rerun).await;
                    let request = Request::ResolveCrash { job_id: job, rerun: can_rerun && decision == CrashDecision::Rerun };
                    match self.client.call(&request).await {
                        Ok(Response::Ok) => {}
                        Ok(other) => return reject(other),
                        Err(ClientError::Reconnected) => self.catch_up().await?,
                        Err(e) => return Err(e),
                    }
                }
                Step::Prompt(prompt) => {
                    if let Some(end) = self.answer(&prompt).await? {
                        return Ok(end);
                    }
                }
            }
        }
    }

    /// Let the operator pick finished jobs to run again. True when any
    /// were re-armed and the flow goes on.
    async fn offer_reruns(&mut self) -> Result<bool, ClientError> {
        let candidates = match self.client.call(&Request::GetRerunCandidates).await {
            Ok(Response::RerunCandidates { jobs }) => jobs,
            Ok(other) => return reject(other),
            Err(ClientError::Reconnected) => {
                self.catch_up().await?;
                return Ok(true);
            }
            Err(e) => return Err(e),
        };
        if candidates.is_empty() {
            return Ok(false);
        }
        let picking = self.ui.choose_reruns(&candidates);
        let chosen = match self.prompt_timeout {
            Some(limit) => match tokio::time::timeout(limit, picking).await {
                Ok(chosen) => chosen,
                Err(_) => {
                    tracing::warn!(candidates = candidates.len(), "rerun prompt timed out");
                    Vec::new()
                }
            },
            None => picking.await,
        };
        if chosen.is_empty() {
            return Ok(false);
        }
        match self.client.call(&Request::PrepareRerun { job_ids: chosen }).await {
            Ok(Response::RerunPrepared { job_ids }) => {
                tracing::info!(jobs = job_ids.len(), "jobs re-armed");
                Ok(true)
            }
            Ok(other) => reject(other),
            Err(ClientError::Reconnected) => {
                self.catch_up().await?;
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }

    async fn answer(&mut self, prompt: &Prompt) -> Result<Option<RemoteEnd>, ClientError> {
        let choice = if prompt.interactive || prompt.phase == PromptPhase::Verdict {
            self.ask(prompt).await
        } else {
            Choice::new(Verb::Run)
        };
        let request = Request::RunCurrentJob { job_id: prompt.job.id.clone(), choice };
        match self.client.call_watched(&request).await {
            Ok(Response::JobOutcome { outcome: StepOutcome::Quit }) => Ok(Some(RemoteEnd::Quit(self.summary().await?))),
            Ok(Response::JobOutcome { .. }) => Ok(None),
            Ok(other) => reject(other),
            Err(ClientError::Rejected(reason)) if reason != cb_wire::NOT_DRIVER => {
                self.ui.rejected(prompt, &reason);
                Ok(None)
            }
            Err(ClientError::Reconnected) => {
                self.catch_up().await?;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn ask(&mut self, prompt: &Prompt) -> Choice {
        let Some(limit) = self.prompt_timeout else {
            return self.ui.choose(prompt).await;
        };
        match tokio::time::timeout(limit, self.ui.choose(prompt)).await {
            Ok(choice) => choice,
            Err(_) => {
                tracing::warn!(job_id = %prompt.job.id, default = %prompt.default, "prompt timed out");
                println!("no response, choosing {}", prompt.default);
                Choice::with_comment(prompt.default, "no operator response")
            }
        }
    }

    /// After a reconnect the agent may still be executing the job this
    /// controller asked for; wait until it is idle.
    async fn catch_up(&mut self) -> Result<(), ClientError> {
        self.restart_printer().await;
        loop {
            match self.client.call(&Request::GetSessionState).await {
                Ok(Response::SessionState { state: Some(status), .. }) if status.busy => {
                    tokio::time::sleep(self.client.config().liveness_interval).await;
                }
                Ok(Response::SessionState { .. }) => return Ok(()),
                Ok(other) => return reject(other),
                Err(ClientError::Reconnected) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    async fn summary(&mut self) -> Result<SessionSummary, ClientError> {
        loop {
            match self.client.call(&Request::GetSessionState).await {
                Ok(Response::SessionState { state, .. }) => {
                    return Ok(state.map(|s| s.summary).unwrap_or_default());
                }
                Ok(other) => return reject(other),
                Err(ClientError::Reconnected) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Remove the completed session from the agent.
    pub async fn finish(&mut self) -> Result<SessionSummary, ClientError> {
        loop {
            match self.client.call(&Request::FinishSession).await {
                Ok(Response::SessionFinished { summary }) => return Ok(summary),
                Ok(other) => return reject(other),
                Err(ClientError::Reconnected) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    async fn restart_printer(&mut self) {
        if let Some(printer) = self.printer.take() {
            printer.abort();
        }
        let config = self.client.config().clone();
        let client_id = self.client.client_id().to_string();
        self.printer = Some(spawn_event_printer(config, client_id).await);
    }
}

impl<I> Drop for Controller<I> {
    fn drop(&mut self) {
        if let Some(printer) = self.printer.take() {
            printer.abort();
        }
    }
}

async fn subscribe(config: &ClientConfig, client_id: &str) -> Result<TcpStream, ClientError> {
    let (mut stream, _) = AgentClient::open(config, client_id, Role::Observer).await?;
    write_frame(&mut stream, &Request::Subscribe, config.timeout).await?;
    match read_frame(&mut stream, Some(config.timeout)).await? {
        Response::Ok => Ok(stream),
        other => reject(other),
    }
}

/// Print job events from a subscribed side connection until aborted.
///
/// The first subscription is made before returning so no event of the next
/// job is missed.
pub async fn spawn_event_printer(config: ClientConfig, client_id: String) -> JoinHandle<()> {
    let first = subscribe(&config, &client_id).await;
    tokio::spawn(async move {
        let mut next = first.ok();
        let mut attempt = 0u32;
        loop {
            if let Some(mut stream) = next.take() {
                attempt = 0;
                while let Ok(response) = read_frame::<Response, _>(&mut stream, None).await {
                    if let Response::Event { event } = response {
                        output::print_event(&event);
                    }
                }
            }
            tokio::time::sleep(config.reconnect.delay(attempt)).await;
            attempt = attempt.saturating_add(1);
            next = match subscribe(&config, &client_id).await {
                Ok(stream) => Some(stream),
                Err(e) => {
                    tracing::debug!(error = %e, "event subscription failed");
                    None
                }
            };
        }
    })
}

/// Ask the agent to stop the running job and halt the session.
pub async fn cancel_session(config: &ClientConfig, client_id: &str) -> Result<(), ClientError> {
    let (mut stream, _) = AgentClient::open(config, client_id, Role::Controller).await?;
    write_frame(&mut stream, &Request::CancelSession, config.timeout).await?;
    match read_frame(&mut stream, Some(config.timeout)).await? {
        Response::Ok => Ok(()),
        other => reject(other),
    }
}

#[cfg(test)]
#[path = "controller_tests.rs"]
mod tests;
