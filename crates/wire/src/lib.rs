// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent/controller protocol.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload.
//!
//! A connection starts with [`Request::Hello`]. Afterwards it carries one
//! request/response pair at a time, until the client sends
//! [`Request::Subscribe`]; from then on the agent only writes
//! [`Response::Event`] frames to it.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod request;
mod response;
mod status;
mod wire;

pub use request::{Request, Role};
pub use response::{PlanEntry, Response};
pub use status::{JobStatusEntry, SessionStatus};
pub use wire::{
    decode, encode, read_frame, read_message, write_frame, write_message, ProtocolError,
    MAX_FRAME_SIZE,
};

/// Default TCP port of the agent.
pub const DEFAULT_PORT: u16 = 18871;

/// Error text sent to a controller that lost the driver slot.
pub const NOT_DRIVER: &str = "another controller is driving this session";

/// Whether two protocol versions can talk to each other.
///
/// Build metadata after `+` is ignored.
pub fn compatible(ours: &str, theirs: &str) -> bool {
    let base = |v: &str| v.split('+').next().unwrap_or_default().to_string();
    base(ours) == base(theirs)
}

#[cfg(test)]
mod property_tests;

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
