// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job command execution.

use crate::io_log::{IoLine, Stream};
use async_trait::async_trait;
use cb_core::JobId;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to start {job}: {source}")]
    Spawn {
        job: JobId,
        #[source]
        source: std::io::Error,
    },
    #[error("failed waiting for {job}: {source}")]
    Wait {
        job: JobId,
        #[source]
        source: std::io::Error,
    },
}

/// Everything needed to launch one job command.
#[derive(Debug, Clone)]
pub struct RunSpec {
    pub job_id: JobId,
    pub command: String,
    pub cwd: PathBuf,
    pub env: BTreeMap<String, String>,
    /// Run as this user instead of the agent's own.
    pub user: Option<String>,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Code(i32),
    Signal(i32),
    TimedOut,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct RunOutput {
    pub exit: Exit,
    /// Complete raw stdout, for resource and attachment jobs.
    pub stdout: Vec<u8>,
    pub duration: Duration,
}

/// Runs job commands. Output lines are sent on `lines` as they arrive; the
/// sender is dropped when the command has finished.
#[async_trait]
pub trait JobRunner: Send + Sync + 'static {
    async fn run(
        &self,
        spec: RunSpec,
        lines: mpsc::UnboundedSender<IoLine>,
        cancel: CancellationToken,
    ) -> Result<RunOutput, RunError>;
}

/// Runs commands with `bash -c` in their own process group.
///
/// Timeout and cancellation send SIGTERM to the group, then SIGKILL once
/// `kill_grace` has passed.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    kill_grace: Duration,
    current_user: Option<String>,
}

impl ProcessRunner {
    pub fn new(kill_grace: Duration) -> Self {
        Self { kill_grace, current_user: current_user_name() }
    }

    fn command(&self, spec: &RunSpec) -> tokio::process::Command {
        let switch_user = spec.user.as_deref().filter(|u| Some(*u) != self.current_user.as_deref());
        let mut cmd = match switch_user {
            // sudo resets the environment, so pass it explicitly through env(1)
            Some(user) => {
                let mut cmd = tokio::process::Command::new("sudo");
                cmd.args(["-n", "-u", user, "--", "env"]);
                cmd.args(spec.env.iter().map(|(k, v)| format!("{k}={v}")));
                cmd.args(["bash", "-c", spec.command.as_str()]);
                cmd
            }
            None => {
                let mut cmd = tokio::process::Command::new("bash");
                cmd.arg("-c").arg(&spec.command).envs(&spec.env);
                cmd
            }
        };
        cmd.current_dir(&spec.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl JobRunner for ProcessRunner {
    async fn run(
        &self,
        spec: RunSpec,
        lines: mpsc::UnboundedSender<IoLine>,
        cancel: CancellationToken,
    ) -> Result<RunOutput, RunError> {
        let started = Instant::now();
        tracing::info!(
            job_id = %spec.job_id,
            command = %spec.command,
            user = spec.user.as_deref().unwrap_or("-"),
            cwd = %spec.cwd.display(),
            "running job command"
        );
        let mut child = self
            .command(&spec)
            .spawn()
            .map_err(|source| RunError::Spawn { job: spec.job_id.clone(), source })?;
        let pgid = child.id().map(|id| Pid::from_raw(id as i32));

        let stdout = child.stdout.take().map(|out| {
            tokio::spawn(pump(out, Stream::Stdout, lines.clone(), started, true))
        });
        let stderr = child.stderr.take().map(|err| {
            tokio::spawn(pump(err, Stream::Stderr, lines.clone(), started, false))
        });
        drop(lines);

        let deadline = async {
            match spec.timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending().await,
            }
        };
        let exit = tokio::select! {
            status = child.wait() => {
                let status = status.map_err(|source| RunError::Wait { job: spec.job_id.clone(), source })?;
                exit_of(status)
            }
            _ = deadline => {
                tracing::warn!(job_id = %spec.job_id, timeout = ?spec.timeout, "job timed out");
                self.terminate(&spec.job_id, pgid, &mut child).await;
                Exit::TimedOut
            }
            _ = cancel.cancelled() => {
                tracing::info!(job_id = %spec.job_id, "job cancelled");
                self.terminate(&spec.job_id, pgid, &mut child).await;
                Exit::Cancelled
            }
        };

        let stdout = self.drain(&spec.job_id, pgid, stdout, stderr).await;
        let duration = started.elapsed();
        tracing::info!(job_id = %spec.job_id, ?exit, elapsed_ms = duration.as_millis() as u64, "job command finished");
        Ok(RunOutput { exit, stdout, duration })
    }
}

impl ProcessRunner {
    /// Wait for the output pumps to reach end of file.
    ///
    /// Background processes the job left behind keep the pipes open; after
    /// `kill_grace` the group is killed and then the pumps are abandoned.
    async fn drain(
        &self,
        job_id: &JobId,
        pgid: Option<Pid>,
        stdout: Option<JoinHandle<Vec<u8>>>,
        stderr: Option<JoinHandle<Vec<u8>>>,
    ) -> Vec<u8> {
        let aborts: Vec<_> = stdout.iter().chain(stderr.iter()).map(|t| t.abort_handle()).collect();
        let drained = async {
            if let Some(task) = stderr {
                let _ = task.await;
            }
            match stdout {
                Some(task) => task.await.unwrap_or_default(),
                None => Vec::new(),
            }
        };
        tokio::pin!(drained);
        if let Ok(out) = tokio::time::timeout(self.kill_grace, &mut drained).await {
            return out;
        }
        tracing::warn!(job_id = %job_id, "job left processes holding its output, killing them");
        if let Some(pgid) = pgid {
            if let Err(e) = killpg(pgid, Signal::SIGKILL) {
                tracing::debug!(job_id = %job_id, error = %e, "SIGKILL failed");
            }
        }
        match tokio::time::timeout(self.kill_grace, &mut drained).await {
            Ok(out) => out,
            Err(_) => {
                tracing::warn!(job_id = %job_id, "abandoning job output");
                for abort in &aborts {
                    abort.abort();
                }
                drained.await
            }
        }
    }

    async fn terminate(
        &self,
        job_id: &JobId,
        pgid: Option<Pid>,
        child: &mut tokio::process::Child,
    ) {
        let Some(pgid) = pgid else { return };
        if let Err(e) = killpg(pgid, Signal::SIGTERM) {
            tracing::debug!(job_id = %job_id, error = %e, "SIGTERM failed");
        }
        if tokio::time::timeout(self.kill_grace, child.wait()).await.is_err() {
            tracing::warn!(job_id = %job_id, "job ignored SIGTERM, killing");
            if let Err(e) = killpg(pgid, Signal::SIGKILL) {
                tracing::debug!(job_id = %job_id, error = %e, "SIGKILL failed");
            }
            let _ = child.wait().await;
        }
    }
}

fn exit_of(status: ExitStatus) -> Exit {
    use std::os::unix::process::ExitStatusExt;
    match (status.code(), status.signal()) {
        (Some(code), _) => Exit::Code(code),
        (None, Some(signal)) => Exit::Signal(signal),
        (None, None) => Exit::Code(-1),
    }
}

/// Forward lines to `tx`, returning the raw bytes when `capture` is set.
///
/// Lines that are not UTF-8 are decoded lossily for the log; reading
/// continues until end of file either way.
async fn pump(
    reader: impl AsyncRead + Unpin,
    stream: Stream,
    tx: mpsc::UnboundedSender<IoLine>,
    started: Instant,
    capture: bool,
) -> Vec<u8> {
    let mut captured = Vec::new();
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                if capture {
                    captured.extend_from_slice(&buf);
                }
                let line = String::from_utf8_lossy(trim_newline(&buf)).into_owned();
                let elapsed_secs = started.elapsed().as_secs_f64();
                let _ = tx.send(IoLine { elapsed_secs, stream, line });
            }
            Err(e) => {
                tracing::debug!(%stream, error = %e, "stopped reading job output");
                break;
            }
        }
    }
    captured
}

fn trim_newline(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn current_user_name() -> Option<String> {
    nix::unistd::User::from_uid(nix::unistd::geteuid()).ok().flatten().map(|u| u.name)
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
