// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection to a remote agent.
//!
//! A lost connection is re-established with exponential backoff inside a
//! bounded budget. The request that noticed the loss then fails with
//! [`ClientError::Reconnected`] so the caller can start over from a fresh
//! `GetNextJob`; every agent request is safe to repeat.

use std::net::SocketAddr;
use std::time::Duration;

use cb_wire::{read_frame, write_frame, ProtocolError, Request, Response, Role, SessionStatus};
use thiserror::Error;
use tokio::net::TcpStream;

use crate::env::PROTOCOL_VERSION;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("cannot connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("connecting to {0} timed out")]
    ConnectTimeout(String),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// The agent answered with an error.
    #[error("{0}")]
    Rejected(String),
    #[error("unexpected response from agent: {0}")]
    UnexpectedResponse(String),
    #[error("connection to the agent was lost and restored")]
    Reconnected,
    #[error("agent at {addr} unreachable after {attempts} attempts")]
    Unreachable { addr: String, attempts: u32 },
}

impl ClientError {
    /// The connection is unusable and worth re-establishing.
    pub fn is_transport(&self) -> bool {
        matches!(self, ClientError::Connect { .. } | ClientError::ConnectTimeout(_) | ClientError::Protocol(_))
    }
}

pub(crate) fn reject<T>(response: Response) -> Result<T, ClientError> {
    match response {
        Response::Error { message } => Err(ClientError::Rejected(message)),
        other => Err(ClientError::UnexpectedResponse(format!("{other:?}"))),
    }
}

/// Bounded exponential backoff between connection attempts.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub attempts: u32,
    pub initial: Duration,
    pub max: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { attempts: 30, initial: Duration::from_millis(250), max: Duration::from_secs(8) }
    }
}

impl ReconnectPolicy {
    /// Delay before attempt `n`, doubling from `initial` up to `max`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial.saturating_mul(factor).min(self.max)
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub addr: String,
    pub token: Option<String>,
    /// Connect and request timeout, except while a job runs.
    pub timeout: Duration,
    pub reconnect: ReconnectPolicy,
    /// How often the agent is probed while waiting for a job to finish.
    pub liveness_interval: Duration,
}

impl ClientConfig {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            token: None,
            timeout: Duration::from_secs(5),
            reconnect: ReconnectPolicy::default(),
            liveness_interval: Duration::from_secs(5),
        }
    }
}

/// `host` or `host:port`; the default agent port is added when missing.
pub fn agent_addr(host: &str) -> String {
    if host.parse::<SocketAddr>().is_ok() {
        return host.to_string();
    }
    match host.rsplit_once(':') {
        Some((name, port)) if !name.contains(':') && port.parse::<u16>().is_ok() => host.to_string(),
        // Bare IPv6 address
        Some(_) => format!("[{host}]:{}", cb_wire::DEFAULT_PORT),
        None => format!("{host}:{}", cb_wire::DEFAULT_PORT),
    }
}

/// What the agent said in its Hello.
#[derive(Debug, Clone)]
pub struct Greeting {
    pub version: String,
    pub driver: bool,
    pub session: Option<SessionStatus>,
    /// Why the agent could not resume its last session
    pub resume_error: Option<String>,
}

pub struct AgentClient {
    config: ClientConfig,
    /// Kept across reconnects so the agent hands the driver slot back.
    client_id: String,
    stream: Option<TcpStream>,
}

impl AgentClient {
    pub fn new(config: ClientConfig) -> Self {
        Self { config, client_id: uuid::Uuid::new_v4().to_string(), stream: None }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Open a connection and complete the Hello handshake.
    pub async fn open(
        config: &ClientConfig,
        client_id: &str,
        role: Role,
    ) -> Result<(TcpStream, Greeting), ClientError> {
        let mut stream = match tokio::time::timeout(config.timeout, TcpStream::connect(&config.addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => return Err(ClientError::Connect { addr: config.addr.clone(), source }),
            Err(_) => return Err(ClientError::ConnectTimeout(config.addr.clone())),
        };
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(error = %e, "failed to set TCP_NODELAY");
        }
        let hello = Request::Hello {
            version: PROTOCOL_VERSION.to_string(),
            role,
            client_id: client_id.to_string(),
            token: config.token.clone(),
        };
        write_frame(&mut stream, &hello, config.timeout).await?;
        match read_frame(&mut stream, Some(config.timeout)).await? {
            Response::Hello { version, driver, session, resume_error } => {
                tracing::debug!(%version, driver, ?role, "connected to agent");
                Ok((stream, Greeting { version, driver, session: session.map(|s| *s), resume_error }))
            }
            other => reject(other),
        }
    }

    /// Connect as the driving controller, retrying within the reconnect budget.
    pub async fn connect(&mut self) -> Result<Greeting, ClientError> {
        self.establish(false).await
    }

    async fn establish(&mut self, lost: bool) -> Result<Greeting, ClientError> {
        self.stream = None;
        let policy = self.config.reconnect.clone();
        let attempts = policy.attempts.max(1);
        for attempt in 0..attempts {
            if lost || attempt > 0 {
                tokio::time::sleep(policy.delay(attempt)).await;
            }
            match Self::open(&self.config, &self.client_id, Role::Controller).await {
                Ok((stream, greeting)) => {
                    if lost {
                        tracing::info!(addr = %self.config.addr, attempt, "reconnected to agent");
                    }
                    self.stream = Some(stream);
                    return Ok(greeting);
                }
                Err(e) if e.is_transport() => {
                    tracing::debug!(addr = %self.config.addr, attempt, error = %e, "agent not reachable");
                }
                Err(e) => return Err(e),
            }
        }
        tracing::warn!(addr = %self.config.addr, attempts, "giving up on agent");
        Err(ClientError::Unreachable { addr: self.config.addr.clone(), attempts })
    }

    /// Send one request and wait up to the configured timeout for its response.
    pub async fn call(&mut self, request: &Request) -> Result<Response, ClientError> {
        let result = self.exchange(request).await;
        self.recover(result).await
    }

    /// Send a request that runs a job and wait however long the job takes.
    ///
    /// The agent is probed on side connections meanwhile. Two probes in a
    /// row that find no job executing mean the agent restarted under this
    /// connection.
    pub async fn call_watched(&mut self, request: &Request) -> Result<Response, ClientError> {
        let result = self.exchange_watched(request).await;
        self.recover(result).await
    }

    async fn exchange(&mut self, request: &Request) -> Result<Response, ClientError> {
        let timeout = self.config.timeout;
        let stream = self.stream.as_mut().ok_or(ProtocolError::ConnectionClosed)?;
        write_frame(stream, request, timeout).await?;
        Ok(read_frame(stream, Some(timeout)).await?)
    }

    async fn exchange_watched(&mut self, request: &Request) -> Result<Response, ClientError> {
        let config = self.config.clone();
        let client_id = self.client_id.clone();
        let stream = self.stream.as_mut().ok_or(ProtocolError::ConnectionClosed)?;
        write_frame(stream, request, config.timeout).await?;

        let mut probe = tokio::time::interval(config.liveness_interval);
        probe.tick().await;
        let mut idle = 0;
        let reply = read_frame::<Response, _>(stream, None);
        tokio::pin!(reply);
        loop {
            tokio::select! {
                response = &mut reply => return Ok(response?),
                _ = probe.tick() => {
                    let (_, greeting) = Self::open(&config, &client_id, Role::Observer).await?;
                    if greeting.session.as_ref().is_some_and(|s| s.busy) {
                        idle = 0;
                    } else {
                        idle += 1;
                        tracing::debug!(idle, "agent reports no job executing");
                        if idle >= 2 {
                            return Err(ProtocolError::ConnectionClosed.into());
                        }
                    }
                }
            }
        }
    }

    async fn recover(&mut self, result: Result<Response, ClientError>) -> Result<Response, ClientError> {
        match result {
            Ok(Response::Error { message }) => Err(ClientError::Rejected(message)),
            Ok(response) => Ok(response),
            Err(e) if e.is_transport() => {
                tracing::warn!(addr = %self.config.addr, error = %e, "connection to agent lost");
                println!("Connection lost!");
                self.establish(true).await?;
                Err(ClientError::Reconnected)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
