// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Checkpoint encoding.
//!
//! A checkpoint is the complete session state at a point in time, wrapped in
//! a versioned envelope and compressed with zstd.

use cb_core::Session;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Current checkpoint schema version
pub const CURRENT_CHECKPOINT_VERSION: u32 = 1;

const ZSTD_LEVEL: i32 = 3;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported checkpoint version {found} (expected {CURRENT_CHECKPOINT_VERSION})")]
    Version { found: u32 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Envelope<S> {
    #[serde(rename = "v")]
    version: u32,
    saved_at: DateTime<Utc>,
    session: S,
}

/// Only the version, so a newer checkpoint is reported as such rather than
/// as a field mismatch.
#[derive(Deserialize)]
struct VersionProbe {
    #[serde(rename = "v")]
    version: u32,
}

pub fn encode(session: &Session, saved_at: DateTime<Utc>) -> Result<Vec<u8>, CheckpointError> {
    let envelope = Envelope { version: CURRENT_CHECKPOINT_VERSION, saved_at, session };
    let json = serde_json::to_vec(&envelope)?;
    Ok(zstd::encode_all(json.as_slice(), ZSTD_LEVEL)?)
}

pub fn decode(bytes: &[u8]) -> Result<(Session, DateTime<Utc>), CheckpointError> {
    let json = zstd::decode_all(bytes)?;
    let probe: VersionProbe = serde_json::from_slice(&json)?;
    if probe.version != CURRENT_CHECKPOINT_VERSION {
        return Err(CheckpointError::Version { found: probe.version });
    }
    let envelope: Envelope<Session> = serde_json::from_slice(&json)?;
    Ok((envelope.session, envelope.saved_at))
}

#[cfg(test)]
#[path = "checkpoint_tests.rs"]
mod tests;
