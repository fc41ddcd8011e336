// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use cb_core::{JobId, JobResult, SessionSummary};
use cb_engine::{StageEvent, Stream};
use clap::ValueEnum;
use serde::Serialize;

use crate::color;

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;

#[derive(Clone, Copy, Debug, Default, PartialEq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Format a timestamp as relative time (e.g., "5s", "2m 3s", "1h 4m")
pub fn format_time_ago(epoch_ms: u64) -> String {
    if epoch_ms == 0 {
        return "-".to_string();
    }
    let now_ms = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;
    cb_core::format_elapsed_ms(now_ms.saturating_sub(epoch_ms))
}

/// One-line outcome counts, e.g. `3 jobs: 2 pass, 1 fail`.
pub fn summary_line(summary: &SessionSummary) -> String {
    let counts = [
        ("pass", summary.pass),
        ("fail", summary.fail),
        ("crash", summary.crash),
        ("skip", summary.skip),
        ("not-supported", summary.not_supported),
        ("not run", summary.not_run),
    ];
    let parts: Vec<String> =
        counts.iter().filter(|(_, n)| *n > 0).map(|(label, n)| format!("{n} {label}")).collect();
    let noun = if summary.total == 1 { "job" } else { "jobs" };
    if parts.is_empty() {
        format!("{} {noun}", summary.total)
    } else {
        format!("{} {noun}: {}", summary.total, parts.join(", "))
    }
}

/// Line printed after a job reaches its outcome.
pub fn result_line(job: &JobId, result: &JobResult) -> String {
    let mut line = format!("{} {}", color::outcome(result.outcome), job);
    if let Some(ms) = result.duration_ms {
        line.push_str(&format!(" {}", color::muted(&format!("({})", cb_core::format_elapsed_ms(ms)))));
    }
    if let Some(comments) = result.comments.as_deref().filter(|c| !c.is_empty()) {
        line.push_str(&format!(" {}", color::context(&format!("- {comments}"))));
    }
    line
}

/// Job progress: a header when a job starts, its IO verbatim, its result.
pub fn print_event(event: &StageEvent) {
    match event {
        StageEvent::JobStarted { job_id } => {
            println!("{} {}", color::muted("running"), color::header(job_id.as_str()));
        }
        StageEvent::Io { line, .. } => match line.stream {
            Stream::Stdout => println!("{}", line.line),
            Stream::Stderr => eprintln!("{}", line.line),
        },
        StageEvent::JobFinished { job_id, result } => println!("{}", result_line(job_id, result)),
    }
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print the final session summary in text or JSON format.
pub fn print_summary(summary: &SessionSummary, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Text => println!("{}", summary_line(summary)),
        OutputFormat::Json => print_json(summary)?,
    }
    Ok(())
}

/// Selection problems are warnings; they go to stderr.
pub fn print_problems<P: std::fmt::Display>(problems: &[P]) {
    for problem in problems {
        eprintln!("warning: {problem}");
    }
}
