// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `cb session` - inspect and remove stored sessions

use std::path::Path;

use anyhow::Result;
use cb_core::SessionId;
use cb_storage::{SessionRepository, StorageError};
use cb_wire::SessionStatus;
use clap::{Args, Subcommand};

use crate::color;
use crate::exit_error::ExitError;
use crate::output::{format_time_ago, print_json, summary_line, OutputFormat};

#[derive(Args)]
pub struct SessionArgs {
    #[command(subcommand)]
    pub command: SessionCommand,
}

#[derive(Subcommand)]
pub enum SessionCommand {
    /// List stored sessions, oldest first
    List {},
    /// Show the jobs and outcomes of a session
    Show {
        /// Session ID
        id: String,
    },
    /// Delete a stored session
    Remove {
        /// Session ID
        id: String,
    },
}

pub fn handle(command: SessionCommand, state_dir: &Path, format: OutputFormat) -> Result<()> {
    let repo = SessionRepository::new(state_dir);
    match command {
        SessionCommand::List {} => handle_list(&repo, format),
        SessionCommand::Show { id } => handle_show(&repo, &SessionId::new(id), format),
        SessionCommand::Remove { id } => {
            let id = SessionId::new(id);
            repo.remove(&id).map_err(storage_error)?;
            if repo.pointer().as_ref() == Some(&id) {
                repo.clear_pointer();
            }
            println!("Removed session {}", color::header(id.as_str()));
            Ok(())
        }
    }
}

fn storage_error(e: StorageError) -> anyhow::Error {
    ExitError::internal(e.to_string()).into()
}

fn handle_list(repo: &SessionRepository, format: OutputFormat) -> Result<()> {
    let listing = repo.list().map_err(storage_error)?;
    match format {
        OutputFormat::Text => {
            if listing.sessions.is_empty() && listing.corrupt.is_empty() {
                println!("No sessions");
            }
            let width = listing.sessions.iter().map(|s| s.id.as_str().len()).max().unwrap_or(0).max("SESSION".len());
            if !listing.sessions.is_empty() {
                println!("{:<width$}  {:<10}  {:>6}  {}", "SESSION", "STATUS", "AGE", "RESULT", width = width);
            }
            for info in &listing.sessions {
                let status = if info.completed { "complete" } else { "incomplete" };
                println!(
                    "{:<width$}  {:<10}  {:>6}  {}",
                    info.id.as_str(),
                    status,
                    format_time_ago(info.created_at_ms),
                    summary_line(&info.summary),
                    width = width
                );
            }
            for (id, reason) in &listing.corrupt {
                println!("{}  {}", id, color::context(&format!("corrupt: {reason}")));
            }
        }
        OutputFormat::Json => {
            let corrupt: Vec<_> = listing
                .corrupt
                .iter()
                .map(|(id, reason)| serde_json::json!({ "id": id, "error": reason }))
                .collect();
            print_json(&serde_json::json!({ "sessions": listing.sessions, "corrupt": corrupt }))?;
        }
    }
    Ok(())
}

fn handle_show(repo: &SessionRepository, id: &SessionId, format: OutputFormat) -> Result<()> {
    let session = repo.peek(id).map_err(storage_error)?;
    let status = SessionStatus::from_session(&session);
    match format {
        OutputFormat::Text => print_status(&status),
        OutputFormat::Json => print_json(&status)?,
    }
    Ok(())
}

fn print_status(status: &SessionStatus) {
    println!("{} {}", color::header(&status.title), color::muted(status.session_id.as_str()));
    if let Some(plan) = &status.test_plan {
        println!("{} {}", color::muted("plan:"), plan);
    }
    for job in &status.jobs {
        let mut line = format!("  {:<14} {}", color::outcome(job.outcome), job.id);
        if let Some(comments) = job.comments.as_deref().filter(|c| !c.is_empty()) {
            line.push_str(&format!(" {}", color::context(&format!("- {comments}"))));
        }
        println!("{line}");
    }
    if let Some(job) = &status.running_job {
        println!("{} {job}", color::muted("running:"));
    }
    if let Some(job) = &status.pending_crash {
        println!("{} {job}", color::muted("crashed, awaiting decision:"));
    }
    println!("{}", summary_line(&status.summary));
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
