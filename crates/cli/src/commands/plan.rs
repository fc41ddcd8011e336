// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `cb plan` - inspect test plans and what they select

use std::path::Path;

use anyhow::Result;
use cb_plan::{resolve, ProviderSet, ResolveError, Resolution};
use clap::{Args, Subcommand};

use super::{load_providers, SelectionArgs};
use crate::color;
use crate::exit_error::ExitError;
use crate::output::{print_json, print_problems, OutputFormat};

#[derive(Args)]
pub struct PlanArgs {
    #[command(subcommand)]
    pub command: PlanCommand,
}

#[derive(Subcommand)]
pub enum PlanCommand {
    /// List test plans from the provider directories
    List {},
    /// Show the jobs a test plan would run, in order
    Resolve {
        /// Test plan id
        plan: String,
        #[command(flatten)]
        selection: SelectionArgs,
    },
}

pub fn handle(command: PlanCommand, state_dir: &Path, format: OutputFormat) -> Result<()> {
    let providers = load_providers(state_dir)?;
    match command {
        PlanCommand::List {} => handle_list(&providers, format),
        PlanCommand::Resolve { plan, selection } => {
            let selection = selection.into_selection();
            match resolve(&providers, &plan, &selection, &Default::default()) {
                Ok(resolution) => print_resolution(&resolution, format),
                Err(ResolveError::Empty { problems }) => {
                    print_problems(&problems);
                    Err(ExitError::internal(format!("{plan}: selection resolved to no jobs")).into())
                }
                Err(e) => Err(ExitError::internal(e.to_string()).into()),
            }
        }
    }
}

fn handle_list(providers: &ProviderSet, format: OutputFormat) -> Result<()> {
    let mut plans: Vec<_> = providers.test_plans().collect();
    plans.sort_by(|a, b| a.id.cmp(&b.id));
    match format {
        OutputFormat::Text => {
            if plans.is_empty() {
                eprintln!("No test plans found");
                return Ok(());
            }
            let width = plans.iter().map(|p| p.id.len()).max().unwrap_or(0);
            for plan in plans {
                println!("{:<width$}  {}", color::header(&plan.id), color::context(&plan.name), width = width);
            }
        }
        OutputFormat::Json => {
            let entries: Vec<_> =
                plans.iter().map(|p| serde_json::json!({ "id": p.id, "name": p.name })).collect();
            print_json(&entries)?;
        }
    }
    Ok(())
}

fn print_resolution(resolution: &Resolution, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            print_problems(&resolution.problems);
            for (n, id) in resolution.run_list.iter().enumerate() {
                let kind = resolution.jobs.get(id).map(|j| j.kind.to_string()).unwrap_or_default();
                let note = if resolution.desired.contains(id) { "" } else { " (dependency)" };
                println!("{:>3}. {} {}{}", n + 1, id, color::muted(&kind), color::muted(note));
            }
        }
        OutputFormat::Json => {
            print_json(&serde_json::json!({
                "run_list": resolution.run_list,
                "desired": resolution.desired,
                "problems": resolution.problems,
            }))?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "plan_tests.rs"]
mod tests;
