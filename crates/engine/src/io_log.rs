// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-job IO logs.
//!
//! One JSON object per line: `{"t": 0.012, "stream": "stdout", "line": ".."}`
//! where `t` is seconds since the job started.

use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stream {
    Stdout,
    Stderr,
}

cb_core::simple_display! {
    Stream {
        Stdout => "stdout",
        Stderr => "stderr",
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IoLine {
    #[serde(rename = "t")]
    pub elapsed_secs: f64,
    pub stream: Stream,
    pub line: String,
}

/// Writer for one job's IO log, open for the duration of the job.
///
/// Write failures are logged via tracing and otherwise ignored; a broken
/// log must not change the job's outcome.
pub struct IoLogWriter {
    path: PathBuf,
    out: Option<BufWriter<File>>,
}

impl IoLogWriter {
    pub fn create(path: &Path) -> Self {
        let out = path
            .parent()
            .map_or(Ok(()), fs::create_dir_all)
            .and_then(|_| OpenOptions::new().create(true).append(true).open(path));
        let out = match out {
            Ok(file) => Some(BufWriter::new(file)),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to open io log");
                None
            }
        };
        Self { path: path.to_path_buf(), out }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&mut self, line: &IoLine) {
        let Some(out) = self.out.as_mut() else { return };
        let result = serde_json::to_string(line)
            .map_err(std::io::Error::other)
            .and_then(|json| writeln!(out, "{json}"));
        if let Err(e) = result {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to write io log");
            self.out = None;
        }
    }

    pub fn finish(mut self) {
        if let Some(mut out) = self.out.take() {
            if let Err(e) = out.flush() {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to flush io log");
            }
        }
    }
}

/// Read an IO log back. Unparseable lines are skipped.
pub fn read_io_log(path: &Path) -> std::io::Result<Vec<IoLine>> {
    let file = File::open(path)?;
    let mut lines = Vec::new();
    for line in BufReader::new(file).lines() {
        if let Ok(parsed) = serde_json::from_str(&line?) {
            lines.push(parsed);
        }
    }
    Ok(lines)
}

#[cfg(test)]
#[path = "io_log_tests.rs"]
mod tests;
