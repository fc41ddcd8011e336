// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! cb-storage: durable session directories and checkpoints

pub mod checkpoint;
mod repository;
mod session_dir;

pub use checkpoint::{CheckpointError, CURRENT_CHECKPOINT_VERSION};
pub use repository::{slug, SessionInfo, SessionListing, SessionRepository};
pub use session_dir::{SessionStorage, RESUME_MARKER};

use cb_core::SessionId;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("session {0} not found")]
    NotFound(SessionId),
    #[error("session {0} is in use by another process")]
    Locked(SessionId),
    #[error("session {id} is corrupt: {reason}")]
    Corrupt { id: SessionId, reason: String },
}

impl StorageError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io { path: path.to_path_buf(), source }
    }
}
