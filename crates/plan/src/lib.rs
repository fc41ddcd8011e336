// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! cb-plan: provider loading, test plans and job selection

pub mod find;
pub mod provider;
pub mod resolve;
mod solver;
pub mod template;
pub mod testplan;

pub use find::collect_provider_files;
pub use provider::{LoadError, ProviderSet};
pub use resolve::{bootstrap_list, resolve, Problem, Resolution, ResolveError, Selection};
pub use template::{interpolate, Template, TemplateError};
pub use testplan::{IdPattern, IncludeEntry, StatusOverride, TestPlan};
