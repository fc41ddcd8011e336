// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session directories under a state root.
//!
//! ```text
//! <root>/
//!   agent-session                 id of the session the agent resumes at boot
//!   sessions/<id>.session/
//!     session                     latest checkpoint
//!     lock                        held by the owning process
//!     io-logs/
//!     session-share/
//! ```

use crate::checkpoint;
use crate::session_dir::{SessionStorage, CHECKPOINT_FILE};
use crate::StorageError;
use cb_core::{Clock, Session, SessionId, SessionSummary};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const SESSION_SUFFIX: &str = ".session";
const POINTER_FILE: &str = "agent-session";

/// One entry of [`SessionRepository::list`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_plan: Option<String>,
    pub created_at_ms: u64,
    pub completed: bool,
    pub summary: SessionSummary,
}

/// Result of listing: readable sessions and the ids that failed to decode.
#[derive(Debug, Default)]
pub struct SessionListing {
    pub sessions: Vec<SessionInfo>,
    pub corrupt: Vec<(SessionId, String)>,
}

#[derive(Debug, Clone)]
pub struct SessionRepository {
    root: PathBuf,
}

impl SessionRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.root.join("sessions")
    }

    /// Directory of `id`, derived from the id alone.
    pub fn session_path(&self, id: &SessionId) -> PathBuf {
        self.sessions_dir().join(format!("{id}{SESSION_SUFFIX}"))
    }

    /// Create a new, locked session directory named after `prefix` and the
    /// current UTC time.
    pub fn create(&self, prefix: &str, clock: &impl Clock) -> Result<SessionStorage, StorageError> {
        let sessions = self.sessions_dir();
        std::fs::create_dir_all(&sessions).map_err(|e| StorageError::io(&sessions, e))?;

        let base = format!("{}{}", slug(prefix), clock.utc().format("%Y-%m-%dT%H.%M.%S"));
        let mut n = 0u32;
        loop {
            let id = if n == 0 { SessionId::new(base.as_str()) } else { SessionId::new(format!("{base}_({n})")) };
            let dir = self.session_path(&id);
            match std::fs::create_dir(&dir) {
                Ok(()) => {
                    tracing::info!(session_id = %id, path = %dir.display(), "created session");
                    return SessionStorage::open_dir(id, dir);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => n += 1,
                Err(e) => return Err(StorageError::io(&dir, e)),
            }
        }
    }

    /// Open and lock an existing session directory.
    pub fn open(&self, id: &SessionId) -> Result<SessionStorage, StorageError> {
        let dir = self.session_path(id);
        if !dir.is_dir() {
            return Err(StorageError::NotFound(id.clone()));
        }
        SessionStorage::open_dir(id.clone(), dir)
    }

    pub fn exists(&self, id: &SessionId) -> bool {
        self.session_path(id).join(CHECKPOINT_FILE).is_file()
    }

    /// Every session with a readable checkpoint, oldest first.
    ///
    /// Reads checkpoints without taking the lock, so a session in use by
    /// another process is still listed.
    pub fn list(&self) -> Result<SessionListing, StorageError> {
        let sessions = self.sessions_dir();
        let mut listing = SessionListing::default();
        let entries = match std::fs::read_dir(&sessions) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(listing),
            Err(e) => return Err(StorageError::io(&sessions, e)),
        };
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(id) = name.strip_suffix(SESSION_SUFFIX) else { continue };
            let id = SessionId::new(id);
            let Ok(bytes) = std::fs::read(entry.path().join(CHECKPOINT_FILE)) else { continue };
            match checkpoint::decode(&bytes) {
                Ok((session, _)) => listing.sessions.push(SessionInfo {
                    id,
                    title: session.title.clone(),
                    test_plan: session.metadata.test_plan.clone(),
                    created_at_ms: session.metadata.created_at_ms,
                    completed: !session.has_flag(cb_core::SessionFlag::Incomplete),
                    summary: session.summary(),
                }),
                Err(e) => listing.corrupt.push((id, e.to_string())),
            }
        }
        listing.sessions.sort_by(|a, b| a.created_at_ms.cmp(&b.created_at_ms).then(a.id.cmp(&b.id)));
        Ok(listing)
    }

    /// Decode the checkpoint of `id` without taking the lock.
    pub fn peek(&self, id: &SessionId) -> Result<Session, StorageError> {
        let path = self.session_path(id).join(CHECKPOINT_FILE);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(id.clone()))
            }
            Err(e) => return Err(StorageError::io(&path, e)),
        };
        checkpoint::decode(&bytes)
            .map(|(session, _)| session)
            .map_err(|e| StorageError::Corrupt { id: id.clone(), reason: e.to_string() })
    }

    /// Delete a session directory. Fails with `Locked` while another process
    /// owns it.
    pub fn remove(&self, id: &SessionId) -> Result<(), StorageError> {
        self.open(id)?.remove()
    }

    fn pointer_path(&self) -> PathBuf {
        self.root.join(POINTER_FILE)
    }

    /// Remember `id` as the session to resume at next agent start.
    pub fn set_pointer(&self, id: &SessionId) -> Result<(), StorageError> {
        let path = self.pointer_path();
        std::fs::create_dir_all(&self.root).map_err(|e| StorageError::io(&self.root, e))?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, id.as_str())
            .and_then(|_| std::fs::rename(&tmp, &path))
            .map_err(|e| StorageError::io(&path, e))
    }

    pub fn pointer(&self) -> Option<SessionId> {
        let content = std::fs::read_to_string(self.pointer_path()).ok()?;
        let id = content.trim();
        (!id.is_empty()).then(|| SessionId::new(id))
    }

    pub fn clear_pointer(&self) {
        let path = self.pointer_path();
        if path.exists() {
            if let Err(e) = std::fs::remove_file(&path) {
                tracing::warn!(path = %path.display(), error = %e, "failed to clear session pointer");
            }
        }
    }
}

/// Keep characters that are safe in a directory name.
pub fn slug(prefix: &str) -> String {
    prefix
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect()
}

#[cfg(test)]
#[path = "repository_tests.rs"]
mod tests;
