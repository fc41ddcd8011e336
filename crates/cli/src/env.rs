// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the CLI.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};

/// Protocol version spoken by this build
pub const PROTOCOL_VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "+", env!("BUILD_GIT_HASH"));

/// Resolve state directory: CB_STATE_DIR > XDG_STATE_HOME/certbench > ~/.local/state/certbench
pub fn state_dir() -> Result<PathBuf> {
    if let Some(dir) = non_empty("CB_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Some(xdg) = non_empty("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("certbench"));
    }
    let home = std::env::var("HOME").map_err(|_| anyhow!("could not determine state directory"))?;
    Ok(PathBuf::from(home).join(".local/state/certbench"))
}

/// Provider directories, colon-separated; `<state_dir>/providers` when unset.
pub fn provider_dirs(state_dir: &Path) -> Vec<PathBuf> {
    match non_empty("CB_PROVIDERS") {
        Some(dirs) => dirs.split(':').filter(|d| !d.is_empty()).map(PathBuf::from).collect(),
        None => vec![state_dir.join("providers")],
    }
}

fn non_empty(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|s| !s.is_empty())
}
