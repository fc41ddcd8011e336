// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Listener task for controller connections.
//!
//! Every connection runs in its own task. Requests that touch the session
//! serialize on the stage lock; a job runs while its `RunCurrentJob` holds
//! that lock, so status and cancel requests are served without it.

mod session;
mod stream;

use std::sync::Arc;

use cb_core::SessionId;
use cb_engine::{CancelHandle, ProcessRunner, StageEvent};
use cb_plan::ProviderSet;
use cb_storage::SessionRepository;
use cb_wire::{
    compatible, read_frame, write_frame, PlanEntry, ProtocolError, Request, Response, Role,
    SessionStatus,
};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::env::PROTOCOL_VERSION;
use crate::lifecycle::{AgentStage, Config};

/// Buffered job events per subscriber before it starts missing lines.
const EVENT_CAPACITY: usize = 1024;

/// Shared agent context for all request handlers.
pub(crate) struct AgentCtx {
    pub config: Config,
    pub repo: SessionRepository,
    pub providers: Arc<ProviderSet>,
    pub runner: Arc<ProcessRunner>,
    /// The current session; held for the whole of a job run
    pub stage: tokio::sync::Mutex<Option<AgentStage>>,
    /// Cancels the running job without taking the stage lock
    pub cancel: Mutex<Option<CancelHandle>>,
    /// Last status taken while the stage lock was free
    pub status: Mutex<Option<SessionStatus>>,
    /// Client id of the controller allowed to mutate the session
    pub driver: Mutex<Option<String>>,
    /// Events of whichever stage is installed, for subscribers
    pub events: broadcast::Sender<StageEvent>,
    /// Why the session named by the pointer could not be resumed
    pub resume_error: Mutex<Option<String>>,
    pub shutdown: CancellationToken,
}

impl AgentCtx {
    pub fn new(
        config: Config,
        repo: SessionRepository,
        providers: Arc<ProviderSet>,
        runner: Arc<ProcessRunner>,
        shutdown: CancellationToken,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            config,
            repo,
            providers,
            runner,
            stage: tokio::sync::Mutex::new(None),
            cancel: Mutex::new(None),
            status: Mutex::new(None),
            driver: Mutex::new(None),
            events,
            resume_error: Mutex::new(None),
            shutdown,
        }
    }

    /// Make `stage` the agent's session.
    pub async fn install(&self, stage: AgentStage) {
        let mut slot = self.stage.lock().await;
        self.adopt(&mut slot, stage);
    }

    /// Install `stage` into an already locked slot.
    fn adopt(&self, slot: &mut Option<AgentStage>, stage: AgentStage) {
        forward_events(stage.subscribe(), self.events.clone());
        *self.cancel.lock() = Some(stage.cancel_handle());
        self.refresh(&stage);
        *slot = Some(stage);
    }

    /// Drop the session from memory.
    fn forget(&self, slot: &mut Option<AgentStage>) {
        *slot = None;
        *self.cancel.lock() = None;
        *self.status.lock() = None;
    }

    fn refresh(&self, stage: &AgentStage) {
        *self.status.lock() = Some(SessionStatus::from_session(stage.session()));
    }

    /// Current status; the cached one, flagged busy, while a job runs.
    pub fn snapshot(&self) -> Option<SessionStatus> {
        match self.stage.try_lock() {
            Ok(slot) => slot.as_ref().map(|stage| SessionStatus::from_session(stage.session())),
            Err(_) => self.status.lock().clone().map(|status| SessionStatus { busy: true, ..status }),
        }
    }

    pub fn resume_error(&self) -> Option<String> {
        self.resume_error.lock().clone()
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.status.lock().as_ref().map(|s| s.session_id.clone())
    }

    /// The newest controller takes the driver slot.
    fn claim_driver(&self, client_id: &str) {
        let previous = self.driver.lock().replace(client_id.to_string());
        match previous {
            Some(prev) if prev != client_id => {
                info!(client_id, previous = %prev, "controller took over the driver slot")
            }
            Some(_) => debug!(client_id, "controller reconnected"),
            None => info!(client_id, "controller attached"),
        }
    }

    fn is_driver(&self, client_id: &str) -> bool {
        self.driver.lock().as_deref() == Some(client_id)
    }

    fn test_plans(&self) -> Vec<PlanEntry> {
        self.providers
            .test_plans()
            .map(|plan| PlanEntry { id: plan.id.clone(), name: plan.name.clone() })
            .collect()
    }
}

/// Relay one stage's events to the agent-wide channel until the stage is gone.
fn forward_events(mut rx: broadcast::Receiver<StageEvent>, tx: broadcast::Sender<StageEvent>) {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let _ = tx.send(event);
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(missed = n, "event relay fell behind")
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

/// Listener task for accepting controller connections.
pub(crate) struct Listener {
    tcp: TcpListener,
    ctx: Arc<AgentCtx>,
}

/// Errors from connection handling.
#[derive(Debug, Error)]
pub(crate) enum ConnectionError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl Listener {
    pub fn new(tcp: TcpListener, ctx: Arc<AgentCtx>) -> Self {
        Self { tcp, ctx }
    }

    /// Accept connections until shutdown, then wait for open ones to close.
    pub async fn run(self) {
        let mut tasks = JoinSet::new();
        loop {
            tokio::select! {
                _ = self.ctx.shutdown.cancelled() => break,
                result = self.tcp.accept() => match result {
                    Ok((stream, addr)) => {
                        debug!("TCP connection from {}", addr);
                        if let Err(e) = stream.set_nodelay(true) {
                            debug!("set_nodelay failed: {}", e);
                        }
                        let ctx = Arc::clone(&self.ctx);
                        tasks.spawn(async move {
                            let (reader, writer) = stream.into_split();
                            tokio::select! {
                                result = handle_connection(reader, writer, &ctx) => {
                                    if let Err(e) = result {
                                        log_connection_error(e);
                                    }
                                }
                                _ = ctx.shutdown.cancelled() => {}
                            }
                        });
                    }
                    Err(e) => error!("TCP accept error: {}", e),
                },
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }
        drop(self.tcp);
        while tasks.join_next().await.is_some() {}
        info!("listener stopped");
    }
}

fn log_connection_error(e: ConnectionError) {
    match e {
        ConnectionError::Protocol(ProtocolError::ConnectionClosed) => debug!("Client disconnected"),
        ConnectionError::Protocol(ProtocolError::Timeout) => warn!("Connection timeout"),
        _ => error!("Connection error: {}", e),
    }
}

/// Handle one controller connection.
///
/// The first frame must be `Hello`. Afterwards requests are answered in
/// order until the client closes the connection or subscribes.
async fn handle_connection<R, W>(
    mut reader: R,
    mut writer: W,
    ctx: &AgentCtx,
) -> Result<(), ConnectionError>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    let timeout = ctx.config.ipc_timeout;
    let hello: Request = read_frame(&mut reader, Some(timeout)).await?;
    let Request::Hello { version, role, client_id, token } = hello else {
        let response = Response::error("connections must start with Hello");
        let _ = write_frame(&mut writer, &response, timeout).await;
        return Ok(());
    };
    if let Some(expected) = &ctx.config.auth_token {
        if token.as_deref() != Some(expected.as_str()) {
            warn!(client_id, "rejected controller with a bad token");
            let _ = write_frame(&mut writer, &Response::error("unauthorized"), timeout).await;
            return Ok(());
        }
    }
    if !compatible(PROTOCOL_VERSION, &version) {
        let message = format!("protocol version {version} is not compatible with {PROTOCOL_VERSION}");
        warn!(client_id, "{}", message);
        let _ = write_frame(&mut writer, &Response::error(message), timeout).await;
        return Ok(());
    }
    if role == Role::Controller {
        ctx.claim_driver(&client_id);
    }
    let response = Response::Hello {
        version: PROTOCOL_VERSION.to_string(),
        driver: ctx.is_driver(&client_id),
        session: ctx.snapshot().map(Box::new),
        resume_error: ctx.resume_error(),
    };
    write_frame(&mut writer, &response, timeout).await?;

    loop {
        let request: Request = match read_frame(&mut reader, None).await {
            Ok(request) => request,
            Err(ProtocolError::ConnectionClosed) => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        // Status polls are frequent; everything else is worth an info line
        if matches!(request, Request::GetSessionState | Request::Ping) {
            debug!(client_id, request = ?request, "received request");
        } else {
            info!(client_id, request = ?request, "received request");
        }

        if request == Request::Subscribe {
            write_frame(&mut writer, &Response::Ok, timeout).await?;
            return stream::stream_events(reader, writer, ctx).await;
        }

        let response = if request.mutates() && !ctx.is_driver(&client_id) {
            Response::error(cb_wire::NOT_DRIVER)
        } else {
            handle_request(request, ctx).await
        };
        debug!("Sending response: {:?}", response);
        write_frame(&mut writer, &response, timeout).await?;
    }
}

/// Handle a single request and return a response.
async fn handle_request(request: Request, ctx: &AgentCtx) -> Response {
    match request {
        Request::Ping => Response::Pong,

        Request::Hello { .. } => Response::error("already greeted"),

        Request::ListTestPlans => Response::TestPlans { plans: ctx.test_plans() },

        Request::StartSession { test_plan, selection } => {
            session::handle_start(ctx, &test_plan, selection).await
        }

        Request::GetNextJob => session::handle_next(ctx).await,

        Request::RunCurrentJob { job_id, choice } => session::handle_run(ctx, &job_id, choice).await,

        Request::ResolveCrash { job_id, rerun } => {
            session::handle_resolve_crash(ctx, &job_id, rerun).await
        }

        Request::GetRerunCandidates => session::handle_rerun_candidates(ctx).await,

        Request::PrepareRerun { job_ids } => session::handle_prepare_rerun(ctx, &job_ids).await,

        Request::GetSessionState => Response::SessionState {
            state: ctx.snapshot().map(Box::new),
            resume_error: ctx.resume_error(),
        },

        Request::CancelSession => session::handle_cancel(ctx),

        Request::FinishSession => session::handle_finish(ctx).await,

        // Intercepted in handle_connection before reaching handle_request
        Request::Subscribe => Response::error("already subscribed"),
    }
}

#[cfg(test)]
#[path = "../listener_tests.rs"]
mod tests;
