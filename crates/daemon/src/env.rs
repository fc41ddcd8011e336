// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the agent crate.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::lifecycle::LifecycleError;

/// Protocol version (from Cargo.toml)
pub const PROTOCOL_VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "+", env!("BUILD_GIT_HASH"));

/// Resolve state directory: CB_STATE_DIR > XDG_STATE_HOME/certbench > ~/.local/state/certbench
pub fn state_dir() -> Result<PathBuf, LifecycleError> {
    if let Some(dir) = non_empty("CB_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Some(xdg) = non_empty("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("certbench"));
    }
    let home = std::env::var("HOME").map_err(|_| LifecycleError::NoStateDir)?;
    Ok(PathBuf::from(home).join(".local/state/certbench"))
}

/// Default IPC timeout
pub fn ipc_timeout() -> Duration {
    millis("CB_IPC_TIMEOUT_MS").unwrap_or(Duration::from_secs(5))
}

/// TCP port the agent listens on.
pub fn port() -> u16 {
    std::env::var("CB_PORT").ok().and_then(|s| s.parse().ok()).unwrap_or(cb_wire::DEFAULT_PORT)
}

/// Address the agent binds to.
pub fn bind_addr() -> String {
    non_empty("CB_BIND").unwrap_or_else(|| "0.0.0.0".to_string())
}

/// Auth token for TCP connections, checked in the Hello handshake.
pub fn auth_token() -> Option<String> {
    non_empty("CB_AUTH_TOKEN")
}

/// Unprivileged user job commands run as.
pub fn normal_user() -> Option<String> {
    non_empty("CB_NORMAL_USER")
}

/// Provider directories, colon-separated; `<state_dir>/providers` when unset.
pub fn provider_dirs(state_dir: &Path) -> Vec<PathBuf> {
    match non_empty("CB_PROVIDERS") {
        Some(dirs) => dirs.split(':').filter(|d| !d.is_empty()).map(PathBuf::from).collect(),
        None => vec![state_dir.join("providers")],
    }
}

/// Timeout for jobs that don't set their own.
pub fn job_timeout() -> Option<Duration> {
    std::env::var("CB_JOB_TIMEOUT_SECS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}

/// Time between SIGTERM and SIGKILL when a job is stopped.
pub fn kill_grace() -> Duration {
    millis("CB_KILL_GRACE_MS").unwrap_or(Duration::from_millis(5000))
}

/// Cap on runs of one job, including crash reruns.
pub fn max_attempts() -> u32 {
    std::env::var("CB_MAX_ATTEMPTS")
        .ok()
        .and_then(|s| s.parse::<u32>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(3)
}

/// Rerun failed jobs once the flow ends, without asking.
pub fn auto_retry() -> bool {
    non_empty("CB_AUTO_RETRY").is_some_and(|s| truthy(&s))
}

fn truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn millis(var: &str) -> Option<Duration> {
    std::env::var(var).ok().and_then(|s| s.parse::<u64>().ok()).map(Duration::from_millis)
}

fn non_empty(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|s| !s.is_empty())
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
