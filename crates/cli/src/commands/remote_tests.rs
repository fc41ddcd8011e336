// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::exit_error::exit_code;
use cb_daemon::{startup, Config};
use cb_storage::SessionRepository;
use clap::Parser;
use serial_test::serial;
use std::net::SocketAddr;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
struct Cli {
    #[command(flatten)]
    args: RemoteArgs,
}

const PROVIDER: &str = r#"
namespace = "t"

[[job]]
id = "ok"
command = "echo ok"

[[job]]
id = "bad"
command = "exit 1"

[[test_plan]]
id = "green"
include = ["ok"]

[[test_plan]]
id = "red"
include = ["ok", "bad"]
"#;

fn clear_env() {
    for var in ["CB_AUTH_TOKEN", "CB_PROMPT_TIMEOUT_SECS", "CB_RECONNECT_ATTEMPTS", "CB_RECONNECT_MAX_BACKOFF_MS"] {
        std::env::remove_var(var);
    }
}

fn args(argv: &[&str]) -> RemoteArgs {
    clear_env();
    let mut full = vec!["test"];
    full.extend_from_slice(argv);
    Cli::try_parse_from(full).unwrap().args
}

async fn start_agent(dir: &std::path::Path) -> (SocketAddr, CancellationToken, tokio::task::JoinHandle<()>) {
    std::fs::create_dir_all(dir.join("providers")).unwrap();
    std::fs::write(dir.join("providers/t.toml"), PROVIDER).unwrap();
    let config = Config { bind: "127.0.0.1".to_string(), port: 0, ..Config::for_state_dir(dir) };
    let started = startup(&config).await.unwrap();
    let addr = started.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(started.serve(shutdown.clone()));
    (addr, shutdown, task)
}

#[test]
#[serial]
fn parse_host_plan_and_reconnect_limits() {
    let args = args(&["dut.local", "t::green", "--reconnect-attempts", "5", "--max-backoff-ms", "1000"]);
    assert_eq!(args.host, "dut.local");
    assert_eq!(args.plan.as_deref(), Some("t::green"));

    let config = args.client_config();
    assert_eq!(config.addr, format!("dut.local:{}", cb_wire::DEFAULT_PORT));
    assert_eq!(config.reconnect.attempts, 5);
    assert_eq!(config.reconnect.max, Duration::from_millis(1000));
    assert_eq!(config.token, None);
}

#[test]
#[serial]
fn token_comes_from_the_environment() {
    clear_env();
    std::env::set_var("CB_AUTH_TOKEN", "s3cret");
    let args = Cli::try_parse_from(["test", "dut:9000"]).unwrap().args;
    std::env::remove_var("CB_AUTH_TOKEN");

    let config = args.client_config();
    assert_eq!(config.token.as_deref(), Some("s3cret"));
    assert_eq!(config.addr, "dut:9000");
    assert!(args.plan.is_none());
}

#[test]
#[serial]
fn backoff_cap_never_drops_below_the_first_delay() {
    let config = args(&["dut", "--max-backoff-ms", "0", "--reconnect-attempts", "0"]).client_config();
    assert_eq!(config.reconnect.max, ReconnectPolicy::default().initial);
    assert_eq!(config.reconnect.attempts, 1);
}

#[tokio::test]
#[serial]
async fn passing_plan_finishes_the_agent_session() {
    let tmp = TempDir::new().unwrap();
    let (addr, shutdown, task) = start_agent(tmp.path()).await;

    handle(args(&[&addr.to_string(), "t::green"]), OutputFormat::Json).await.unwrap();

    let repo = SessionRepository::new(tmp.path());
    assert_eq!(repo.pointer(), None);
    assert!(repo.list().unwrap().sessions.is_empty());
    shutdown.cancel();
    task.await.unwrap();
}

#[tokio::test]
#[serial]
async fn failures_exit_with_one_and_keep_leaves_the_session() {
    let tmp = TempDir::new().unwrap();
    let (addr, shutdown, task) = start_agent(tmp.path()).await;

    let argv = [addr.to_string(), "t::red".into(), "--keep".into(), "--prompt-timeout-secs".into(), "1".into()];
    let argv: Vec<&str> = argv.iter().map(String::as_str).collect();
    let err = handle(args(&argv), OutputFormat::Text).await.unwrap_err();
    assert_eq!(exit_code(&err), 1);
    assert!(SessionRepository::new(tmp.path()).pointer().is_some());
    shutdown.cancel();
    task.await.unwrap();
}

#[tokio::test]
#[serial]
async fn no_plan_and_no_session_is_internal_error() {
    let tmp = TempDir::new().unwrap();
    let (addr, shutdown, task) = start_agent(tmp.path()).await;

    let err = handle(args(&[&addr.to_string()]), OutputFormat::Text).await.unwrap_err();
    assert_eq!(exit_code(&err), 2);
    shutdown.cancel();
    task.await.unwrap();
}

#[tokio::test]
#[serial]
async fn unreachable_agent_is_internal_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = handle(args(&[&addr.to_string(), "--reconnect-attempts", "2", "--max-backoff-ms", "10"]), OutputFormat::Text)
        .await
        .unwrap_err();
    assert_eq!(exit_code(&err), 2);
}

#[tokio::test]
#[serial]
async fn replacing_an_unresumable_session_needs_consent() {
    let with_plan = args(&["dut", "t::green"]);
    let refused = confirm_fresh_start(&mut TerminalInteraction::new(&b"n\n"[..]), "corrupt", &with_plan).await;
    assert_eq!(exit_code(&refused.unwrap_err()), 2);
    confirm_fresh_start(&mut TerminalInteraction::new(&b"y\n"[..]), "corrupt", &with_plan).await.unwrap();

    let fresh = args(&["dut", "t::green", "--fresh"]);
    confirm_fresh_start(&mut TerminalInteraction::new(&b""[..]), "corrupt", &fresh).await.unwrap();
    let no_plan = args(&["dut"]);
    confirm_fresh_start(&mut TerminalInteraction::new(&b""[..]), "corrupt", &no_plan).await.unwrap();
}

#[tokio::test]
#[serial]
async fn fresh_replaces_a_session_the_agent_could_not_resume() {
    let tmp = TempDir::new().unwrap();
    let repo = SessionRepository::new(tmp.path());
    let broken = {
        let storage = repo.create("t::green", &cb_core::SystemClock).unwrap();
        storage.save_checkpoint(b"junk").unwrap();
        storage.id().clone()
    };
    repo.set_pointer(&broken).unwrap();
    let (addr, shutdown, task) = start_agent(tmp.path()).await;

    handle(args(&[&addr.to_string(), "t::green", "--fresh"]), OutputFormat::Json).await.unwrap();

    assert_eq!(repo.pointer(), None);
    assert!(repo.session_path(&broken).is_dir());
    shutdown.cancel();
    task.await.unwrap();
}
