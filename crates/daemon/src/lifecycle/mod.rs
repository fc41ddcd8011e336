// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent lifecycle management: startup, privilege checks, resume on boot.

mod privilege;
mod startup;
pub use privilege::check_privileges;
pub use startup::{startup, StartupResult};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use cb_core::SystemClock;
use cb_engine::{ProcessRunner, Stage, StageConfig, StageDeps, StageError};
use cb_plan::{LoadError, ProviderSet};
use cb_storage::StorageError;
use thiserror::Error;

/// Stage with the agent's concrete runner and clock
pub type AgentStage = Stage<ProcessRunner, SystemClock>;

/// Agent configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Root state directory (e.g. ~/.local/state/certbench)
    pub state_dir: PathBuf,
    /// Path to lock/PID file
    pub lock_path: PathBuf,
    /// Path to agent log file
    pub log_path: PathBuf,
    /// Directories searched for provider files
    pub provider_dirs: Vec<PathBuf>,
    pub bind: String,
    /// 0 picks a free port
    pub port: u16,
    /// Required in the Hello handshake when set
    pub auth_token: Option<String>,
    /// Job commands run as this user
    pub normal_user: Option<String>,
    pub job_timeout: Option<Duration>,
    pub kill_grace: Duration,
    pub max_attempts: u32,
    /// Rerun failed jobs when the flow ends instead of waiting for the operator
    pub auto_retry: bool,
    pub ipc_timeout: Duration,
}

impl Config {
    /// Load configuration from the environment.
    pub fn load() -> Result<Self, LifecycleError> {
        use crate::env;

        let state_dir = env::state_dir()?;
        Ok(Self {
            provider_dirs: env::provider_dirs(&state_dir),
            bind: env::bind_addr(),
            port: env::port(),
            auth_token: env::auth_token(),
            normal_user: env::normal_user(),
            job_timeout: env::job_timeout(),
            kill_grace: env::kill_grace(),
            max_attempts: env::max_attempts(),
            auto_retry: env::auto_retry(),
            ipc_timeout: env::ipc_timeout(),
            ..Self::for_state_dir(state_dir)
        })
    }

    /// Defaults rooted at `state_dir`, ignoring the environment.
    pub fn for_state_dir(state_dir: impl Into<PathBuf>) -> Self {
        let state_dir = state_dir.into();
        Self {
            lock_path: state_dir.join("agent.pid"),
            log_path: state_dir.join("agent.log"),
            provider_dirs: vec![state_dir.join("providers")],
            bind: "0.0.0.0".to_string(),
            port: cb_wire::DEFAULT_PORT,
            auth_token: None,
            normal_user: None,
            job_timeout: None,
            kill_grace: Duration::from_secs(5),
            max_attempts: 3,
            auto_retry: false,
            ipc_timeout: Duration::from_secs(5),
            state_dir,
        }
    }

    pub fn stage_config(&self) -> StageConfig {
        let mut config = StageConfig::default().max_attempts(self.max_attempts).auto_retry(self.auto_retry);
        config.default_timeout = self.job_timeout;
        config.normal_user = self.normal_user.clone();
        config
    }
}

/// Collaborators handed to every stage the agent creates.
pub(crate) fn stage_deps(
    config: &Config,
    providers: &Arc<ProviderSet>,
    runner: &Arc<ProcessRunner>,
) -> StageDeps<ProcessRunner, SystemClock> {
    StageDeps {
        providers: Arc::clone(providers),
        runner: Arc::clone(runner),
        clock: SystemClock,
        config: config.stage_config(),
    }
}

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Could not determine state directory")]
    NoStateDir,

    #[error("Failed to acquire lock: agent already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("Failed to bind {0}: {1}")]
    BindFailed(String, std::io::Error),

    #[error("Privilege check failed: {0}")]
    Privilege(String),

    #[error("Provider error: {0}")]
    Providers(#[from] LoadError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Session error: {0}")]
    Stage(#[from] StageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
