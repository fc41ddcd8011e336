// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::exit_error::exit_code;
use clap::Parser;
use serial_test::serial;
use tempfile::TempDir;

#[derive(Parser)]
struct Cli {
    #[command(flatten)]
    args: RunArgs,
}

const PROVIDER: &str = r#"
namespace = "t"

[[job]]
id = "a"
command = "echo a"

[[job]]
id = "b"
command = "true"
depends = ["a"]

[[job]]
id = "broken"
command = "exit 3"

[[test_plan]]
id = "smoke"
include = ["b"]

[[test_plan]]
id = "broken"
include = ["broken", "a"]
"#;

fn state_dir() -> TempDir {
    std::env::remove_var("CB_PROVIDERS");
    let tmp = TempDir::new().unwrap();
    std::fs::create_dir_all(tmp.path().join("providers")).unwrap();
    std::fs::write(tmp.path().join("providers/t.toml"), PROVIDER).unwrap();
    tmp
}

fn args(argv: &[&str]) -> RunArgs {
    let mut full = vec!["test"];
    full.extend_from_slice(argv);
    Cli::try_parse_from(full).unwrap().args
}

#[test]
#[serial]
fn parse_plan_with_selection_and_limits() {
    std::env::remove_var("CB_MAX_ATTEMPTS");
    std::env::remove_var("CB_AUTO_RETRY");
    let args = args(&["t::smoke", "-i", "t::a", "--keep", "--prompt-timeout-secs", "30"]);
    assert_eq!(args.plan.as_deref(), Some("t::smoke"));
    assert_eq!(args.selection.include, vec!["t::a"]);
    assert!(args.keep);
    assert_eq!(args.max_attempts, 3);

    let config = args.stage_config();
    assert_eq!(config.prompt_timeout, Some(Duration::from_secs(30)));
    assert_eq!(config.default_timeout, None);
    assert!(!config.auto_retry);
}

#[test]
#[serial]
fn auto_retry_comes_from_flag_or_environment() {
    std::env::remove_var("CB_AUTO_RETRY");
    assert!(args(&["t::smoke", "--auto-retry"]).stage_config().auto_retry);

    std::env::set_var("CB_AUTO_RETRY", "true");
    let from_env = args(&["t::smoke"]).stage_config();
    std::env::remove_var("CB_AUTO_RETRY");
    assert!(from_env.auto_retry);
}

#[test]
fn plan_or_resume_is_required() {
    assert!(Cli::try_parse_from(["test"]).is_err());
    assert!(Cli::try_parse_from(["test", "t::smoke", "--resume", "s-1"]).is_err());
    assert!(Cli::try_parse_from(["test", "--resume", "s-1"]).is_ok());
}

#[test]
#[serial]
fn zero_attempts_still_runs_once() {
    std::env::remove_var("CB_MAX_ATTEMPTS");
    assert_eq!(args(&["t::smoke", "--max-attempts", "0"]).stage_config().max_attempts, 1);
}

#[tokio::test]
#[serial]
async fn completed_run_removes_its_session() {
    let tmp = state_dir();
    handle(args(&["t::smoke"]), tmp.path(), OutputFormat::Json).await.unwrap();

    let listing = SessionRepository::new(tmp.path()).list().unwrap();
    assert!(listing.sessions.is_empty());
}

#[tokio::test]
#[serial]
async fn keep_leaves_a_completed_session() {
    let tmp = state_dir();
    handle(args(&["t::smoke", "--keep"]), tmp.path(), OutputFormat::Text).await.unwrap();

    let listing = SessionRepository::new(tmp.path()).list().unwrap();
    assert_eq!(listing.sessions.len(), 1);
    assert!(listing.sessions[0].completed);
    assert_eq!(listing.sessions[0].summary.pass, 2);
}

#[tokio::test]
#[serial]
async fn failing_job_exits_with_failures() {
    let tmp = state_dir();
    let err = handle(args(&["t::broken", "--prompt-timeout-secs", "1"]), tmp.path(), OutputFormat::Text)
        .await
        .unwrap_err();
    assert_eq!(exit_code(&err), 1);
}

#[tokio::test]
#[serial]
async fn auto_retry_runs_a_failing_job_up_to_the_cap() {
    std::env::remove_var("CB_MAX_ATTEMPTS");
    let tmp = state_dir();
    let argv = ["t::broken", "--auto-retry", "--max-attempts", "2", "--keep"];
    let err = handle(args(&argv), tmp.path(), OutputFormat::Text).await.unwrap_err();
    assert_eq!(exit_code(&err), 1);

    let repo = SessionRepository::new(tmp.path());
    let listing = repo.list().unwrap();
    assert_eq!(listing.sessions[0].summary.fail, 1);
    let session = repo.open(&listing.sessions[0].id).unwrap().load_session(&cb_core::SystemClock).unwrap();
    assert_eq!(session.state(&cb_core::JobId::new("t::broken")).unwrap().attempts, 2);
}

#[tokio::test]
#[serial]
async fn empty_selection_exits_internal() {
    let tmp = state_dir();
    let err = handle(args(&["t::smoke", "-x", "t::.*"]), tmp.path(), OutputFormat::Text).await.unwrap_err();
    assert_eq!(exit_code(&err), 2);
    assert!(SessionRepository::new(tmp.path()).list().unwrap().sessions.is_empty());
}

#[tokio::test]
#[serial]
async fn resume_unknown_session_exits_internal() {
    let tmp = state_dir();
    let err = handle(args(&["--resume", "nope"]), tmp.path(), OutputFormat::Text).await.unwrap_err();
    assert_eq!(exit_code(&err), 2);
}

#[tokio::test]
#[serial]
async fn corrupt_session_offers_a_fresh_start() {
    let tmp = state_dir();
    let storage = SessionRepository::new(tmp.path()).create("smoke-", &cb_core::FakeClock::new()).unwrap();
    storage.save_checkpoint(b"junk").unwrap();
    let id = storage.id().to_string();
    drop(storage);

    let err = handle(args(&["--resume", &id]), tmp.path(), OutputFormat::Text).await.unwrap_err();

    assert_eq!(exit_code(&err), 2);
    assert!(err.to_string().contains("cb session remove"), "{err}");
}
