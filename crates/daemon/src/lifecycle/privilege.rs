// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Startup check that job commands can run as the normal user.

use std::process::Stdio;

use nix::unistd::{Uid, User};
use tracing::{debug, info};

use super::LifecycleError;

/// Verify that `normal_user` exists and that the agent can switch to it
/// without a password.
pub async fn check_privileges(normal_user: Option<&str>) -> Result<(), LifecycleError> {
    let Some(user) = normal_user else {
        debug!("no normal user configured, jobs run as the agent user");
        return Ok(());
    };
    let account = User::from_name(user)
        .map_err(|e| LifecycleError::Privilege(format!("cannot look up user {user}: {e}")))?
        .ok_or_else(|| LifecycleError::Privilege(format!("user {user} does not exist")))?;
    if account.uid == Uid::effective() {
        return Ok(());
    }

    let status = tokio::process::Command::new("sudo")
        .args(["-n", "-u", user, "--", "true"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map_err(|e| LifecycleError::Privilege(format!("cannot run sudo: {e}")))?;
    if !status.success() {
        return Err(LifecycleError::Privilege(format!(
            "cannot run commands as {user} without a password; start the agent as root"
        )));
    }
    info!(user, "job commands will run as normal user");
    Ok(())
}
