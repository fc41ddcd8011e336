// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI command implementations

pub mod plan;
pub mod remote;
pub mod run;
pub mod session;

use std::path::Path;

use anyhow::Result;
use cb_core::Selection;
use cb_plan::ProviderSet;
use clap::Args;

/// Refinements on top of a test plan's own job selection.
#[derive(Args, Debug, Clone, Default)]
pub struct SelectionArgs {
    /// Also select jobs matching this pattern
    #[arg(long = "include", short = 'i', value_name = "PATTERN")]
    pub include: Vec<String>,
    /// Never select jobs matching this pattern, unless the plan makes them mandatory
    #[arg(long = "exclude", short = 'x', value_name = "PATTERN")]
    pub exclude: Vec<String>,
    /// Keep only selected jobs matching this pattern, plus what they depend on
    #[arg(long = "match", short = 'm', value_name = "PATTERN")]
    pub matching: Vec<String>,
}

impl SelectionArgs {
    pub fn into_selection(self) -> Selection {
        Selection { include: self.include, exclude: self.exclude, matching: self.matching }
    }
}

/// Load provider files; unreadable ones are reported and skipped.
pub(crate) fn load_providers(state_dir: &Path) -> Result<ProviderSet> {
    let providers = ProviderSet::load(&crate::env::provider_dirs(state_dir))?;
    for (path, reason) in providers.skipped() {
        eprintln!("warning: skipped {}: {reason}", path.display());
    }
    Ok(providers)
}
