// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use cb_core::{JobId, JobResult, Outcome, SessionSummary};
use serial_test::serial;

use super::{format_time_ago, print_summary, result_line, summary_line, OutputFormat};

fn summary(pass: usize, fail: usize, skip: usize, not_run: usize) -> SessionSummary {
    SessionSummary { total: pass + fail + skip + not_run, pass, fail, skip, not_run, ..Default::default() }
}

#[yare::parameterized(
    empty = { summary(0, 0, 0, 0), "0 jobs" },
    one = { summary(1, 0, 0, 0), "1 job: 1 pass" },
    mixed = { summary(2, 1, 0, 0), "3 jobs: 2 pass, 1 fail" },
    pending = { summary(0, 0, 1, 2), "3 jobs: 1 skip, 2 not run" },
)]
fn summary_line_counts(summary: SessionSummary, expected: &str) {
    assert_eq!(summary_line(&summary), expected);
}

#[test]
#[serial]
fn result_line_shows_duration_and_comment() {
    std::env::set_var("NO_COLOR", "1");
    let mut result = JobResult::new(Outcome::Skip).with_comments("no camera");
    result.duration_ms = Some(1_500);

    assert_eq!(result_line(&JobId::new("t::cam"), &result), "skip t::cam (1s) - no camera");
}

#[test]
#[serial]
fn result_line_without_extras() {
    std::env::set_var("NO_COLOR", "1");
    assert_eq!(result_line(&JobId::new("t::a"), &JobResult::new(Outcome::Pass)), "pass t::a");
}

#[test]
fn time_ago_of_zero_is_dash() {
    assert_eq!(format_time_ago(0), "-");
}

#[test]
fn print_summary_json_is_ok() {
    assert!(print_summary(&summary(1, 0, 0, 0), OutputFormat::Json).is_ok());
}
