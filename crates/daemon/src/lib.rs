// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! certbench agent library
//!
//! The agent runs on the device under test. It owns the session and its
//! storage, runs job commands, and serves controllers over TCP. The binary
//! is a thin wrapper; tests start agents in-process through [`startup`].

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod env;
pub mod lifecycle;
mod listener;

pub use env::PROTOCOL_VERSION;
pub use lifecycle::{check_privileges, startup, AgentStage, Config, LifecycleError, StartupResult};
