// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent startup and initialization logic.

use std::fs::File;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;

use cb_engine::{ProcessRunner, Stage, StageError};
use cb_plan::ProviderSet;
use cb_storage::{SessionRepository, StorageError};
use fs2::FileExt;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{check_privileges, stage_deps, AgentStage, Config, LifecycleError};
use crate::listener::{AgentCtx, Listener};

/// A started agent, bound but not yet serving.
pub struct StartupResult {
    pub config: Config,
    pub providers: Arc<ProviderSet>,
    /// Session picked up from the `agent-session` pointer
    pub resumed: Option<AgentStage>,
    /// Why the pointer's session could not be resumed
    pub resume_error: Option<String>,
    repo: SessionRepository,
    runner: Arc<ProcessRunner>,
    listener: TcpListener,
    // NOTE(lifetime): Held to maintain exclusive file lock; released on drop
    lock_file: File,
}

impl StartupResult {
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve connections until `shutdown` is cancelled.
    ///
    /// Returns once every connection has ended, so the session directory
    /// and the agent lock are free again.
    pub async fn serve(self, shutdown: CancellationToken) {
        let Self { config, providers, resumed, resume_error, repo, runner, listener, lock_file } = self;
        let ctx = Arc::new(AgentCtx::new(config, repo, providers, runner, shutdown));
        *ctx.resume_error.lock() = resume_error;
        if let Some(stage) = resumed {
            ctx.install(stage).await;
        }
        Listener::new(listener, ctx).run().await;
        drop(lock_file);
        info!("agent stopped");
    }
}

/// Start the agent
pub async fn startup(config: &Config) -> Result<StartupResult, LifecycleError> {
    match startup_inner(config).await {
        Ok(result) => Ok(result),
        Err(e) => {
            // The lock file belongs to the running agent when we lost the race
            if !matches!(e, LifecycleError::LockFailed(_)) {
                cleanup_on_failure(config);
            }
            Err(e)
        }
    }
}

async fn startup_inner(config: &Config) -> Result<StartupResult, LifecycleError> {
    // 1. Create state directory
    std::fs::create_dir_all(&config.state_dir)?;

    // 2. Acquire lock file FIRST - prevents races
    let lock_file = acquire_lock(config)?;

    // 3. Fail fast when job commands cannot run as the normal user
    check_privileges(config.normal_user.as_deref()).await?;

    // 4. Providers
    let providers = Arc::new(ProviderSet::load(&config.provider_dirs)?);
    let runner = Arc::new(ProcessRunner::new(config.kill_grace));

    // 5. Resume the session that was running before the restart
    let repo = SessionRepository::new(config.state_dir.clone());
    let (resumed, resume_error) = match resume_session(&repo, config, &providers, &runner) {
        Ok(resumed) => (resumed, None),
        Err(e) => (None, Some(e)),
    };

    // 6. Bind (LAST - only after all validation passes)
    let addr = format!("{}:{}", config.bind, config.port);
    let listener =
        TcpListener::bind(&addr).await.map_err(|e| LifecycleError::BindFailed(addr.clone(), e))?;
    info!(
        addr = %listener.local_addr().map(|a| a.to_string()).unwrap_or(addr),
        version = crate::env::PROTOCOL_VERSION,
        "agent listening"
    );

    Ok(StartupResult {
        config: config.clone(),
        providers,
        resumed,
        resume_error,
        repo,
        runner,
        listener,
        lock_file,
    })
}

fn acquire_lock(config: &Config) -> Result<File, LifecycleError> {
    // Don't truncate before holding the lock; the running agent's PID lives there
    let mut lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&config.lock_path)?;
    lock_file.try_lock_exclusive().map_err(LifecycleError::LockFailed)?;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;
    Ok(lock_file)
}

/// Reopen the session named by the pointer file.
///
/// A session that cannot be loaded is left on disk and reported, so the
/// agent still comes up and the operator decides whether to start afresh.
/// Only a pointer to a session that no longer exists is dropped.
fn resume_session(
    repo: &SessionRepository,
    config: &Config,
    providers: &Arc<ProviderSet>,
    runner: &Arc<ProcessRunner>,
) -> Result<Option<AgentStage>, String> {
    let Some(id) = repo.pointer() else {
        return Ok(None);
    };
    let resumed = repo
        .open(&id)
        .map_err(StageError::from)
        .and_then(|storage| Stage::resume(storage, stage_deps(config, providers, runner)));
    match resumed {
        Ok(stage) => {
            info!(
                session_id = %id,
                pending_crash = ?stage.session().metadata.pending_crash,
                "resuming session"
            );
            Ok(Some(stage))
        }
        Err(e @ StageError::Storage(StorageError::NotFound(_))) => {
            warn!(session_id = %id, error = %e, "session is gone, forgetting it");
            repo.clear_pointer();
            Ok(None)
        }
        Err(e) => {
            warn!(session_id = %id, error = %e, "cannot resume session");
            Err(e.to_string())
        }
    }
}

fn cleanup_on_failure(config: &Config) {
    if config.lock_path.exists() {
        if let Err(e) = std::fs::remove_file(&config.lock_path) {
            warn!("Failed to remove lock file: {}", e);
        }
    }
}
