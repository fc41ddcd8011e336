// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A locked session directory.

use crate::checkpoint;
use crate::StorageError;
use cb_core::{Clock, JobId, Outcome, ResumeMarker, Session, SessionId};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const CHECKPOINT_FILE: &str = "session";
const NEXT_FILE: &str = "session.next";
const LOCK_FILE: &str = "lock";
const IO_LOGS_DIR: &str = "io-logs";
const SHARE_DIR: &str = "session-share";
/// Written by a job just before it reboots the machine.
pub const RESUME_MARKER: &str = "__result";

/// Exclusive handle on one session directory.
///
/// The directory lock is held for the lifetime of the handle.
#[derive(Debug)]
pub struct SessionStorage {
    id: SessionId,
    dir: PathBuf,
    _lock: File,
}

impl SessionStorage {
    pub(crate) fn open_dir(id: SessionId, dir: PathBuf) -> Result<Self, StorageError> {
        let lock_path = dir.join(LOCK_FILE);
        // Don't truncate before holding the lock; the owner's pid lives there
        let mut lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|e| StorageError::io(&lock_path, e))?;
        if lock.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked(id));
        }
        lock.set_len(0)
            .and_then(|_| writeln!(lock, "{}", std::process::id()))
            .map_err(|e| StorageError::io(&lock_path, e))?;

        for sub in [IO_LOGS_DIR, SHARE_DIR] {
            let path = dir.join(sub);
            std::fs::create_dir_all(&path).map_err(|e| StorageError::io(&path, e))?;
        }
        Ok(Self { id, dir, _lock: lock })
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn io_logs_dir(&self) -> PathBuf {
        self.dir.join(IO_LOGS_DIR)
    }

    pub fn share_dir(&self) -> PathBuf {
        self.dir.join(SHARE_DIR)
    }

    pub fn io_log_path(&self, job: &JobId) -> PathBuf {
        self.io_logs_dir().join(format!("{}.log", file_stem(job)))
    }

    pub fn attachment_path(&self, job: &JobId) -> PathBuf {
        self.io_logs_dir().join(format!("{}.attachment", file_stem(job)))
    }

    pub fn resume_marker_path(&self) -> PathBuf {
        self.share_dir().join(RESUME_MARKER)
    }

    /// Atomically replace the checkpoint with `bytes`.
    ///
    /// Writes `session.next`, syncs it, renames it over `session`, then syncs
    /// the directory so the rename itself is durable.
    pub fn save_checkpoint(&self, bytes: &[u8]) -> Result<(), StorageError> {
        let next = self.dir.join(NEXT_FILE);
        let path = self.dir.join(CHECKPOINT_FILE);
        let mut file = File::create(&next).map_err(|e| StorageError::io(&next, e))?;
        file.write_all(bytes)
            .and_then(|_| file.sync_all())
            .map_err(|e| StorageError::io(&next, e))?;
        drop(file);
        std::fs::rename(&next, &path).map_err(|e| StorageError::io(&path, e))?;
        File::open(&self.dir)
            .and_then(|d| d.sync_all())
            .map_err(|e| StorageError::io(&self.dir, e))?;
        Ok(())
    }

    /// Raw bytes of the latest checkpoint, if one was ever written.
    pub fn load_checkpoint(&self) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.dir.join(CHECKPOINT_FILE);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::io(&path, e)),
        }
    }

    pub fn save_session(&self, session: &Session, clock: &impl Clock) -> Result<(), StorageError> {
        let bytes = checkpoint::encode(session, clock.utc())
            .map_err(|e| StorageError::Corrupt { id: self.id.clone(), reason: e.to_string() })?;
        self.save_checkpoint(&bytes)?;
        tracing::trace!(session_id = %self.id, bytes = bytes.len(), "checkpoint saved");
        Ok(())
    }

    /// Load the session, finishing any job the previous process left
    /// running.
    ///
    /// The interrupted job takes the outcome from the resume marker when
    /// the job wrote one, and is a crash otherwise. The repaired state is
    /// checkpointed before the marker is removed.
    pub fn load_session(&self, clock: &impl Clock) -> Result<Session, StorageError> {
        let bytes = self.load_checkpoint()?.ok_or_else(|| StorageError::Corrupt {
            id: self.id.clone(),
            reason: "no checkpoint".to_string(),
        })?;
        let (mut session, saved_at) = checkpoint::decode(&bytes)
            .map_err(|e| StorageError::Corrupt { id: self.id.clone(), reason: e.to_string() })?;

        if session.running_job().is_some() {
            let marker = self.read_resume_marker();
            if let Some(job) = session.mark_interrupted(marker) {
                let outcome = session.state(&job).map(|s| s.outcome()).unwrap_or(Outcome::Crash);
                tracing::warn!(
                    session_id = %self.id,
                    job_id = %job,
                    %outcome,
                    checkpoint_at = %saved_at,
                    "job was running when the session was interrupted"
                );
                self.save_session(&session, clock)?;
            }
        }
        self.clear_resume_marker();
        Ok(session)
    }

    /// Marker contents are JSON `{"outcome": .., "comments": ..}` or a bare
    /// outcome name.
    fn read_resume_marker(&self) -> Option<ResumeMarker> {
        let content = std::fs::read_to_string(self.resume_marker_path()).ok()?;
        if let Ok(marker) = serde_json::from_str::<ResumeMarker>(&content) {
            return Some(marker);
        }
        let word = serde_json::Value::String(content.trim().to_lowercase());
        match serde_json::from_value::<Outcome>(word) {
            Ok(outcome) => Some(ResumeMarker { outcome, comments: None }),
            Err(_) => {
                tracing::warn!(session_id = %self.id, "ignoring unreadable resume marker");
                None
            }
        }
    }

    /// Remove a marker left behind by an earlier job.
    pub fn clear_resume_marker(&self) {
        let path = self.resume_marker_path();
        if path.exists() {
            if let Err(e) = std::fs::remove_file(&path) {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove resume marker");
            }
        }
    }

    /// Delete the whole session directory.
    pub fn remove(self) -> Result<(), StorageError> {
        std::fs::remove_dir_all(&self.dir).map_err(|e| StorageError::io(&self.dir, e))?;
        tracing::info!(session_id = %self.id, "removed session");
        Ok(())
    }
}

/// Job ids contain `::` and `/`; neither is welcome in a file name.
fn file_stem(job: &JobId) -> String {
    job.as_str().replace("::", "__").replace('/', "_")
}

#[cfg(test)]
#[path = "session_dir_tests.rs"]
mod tests;
