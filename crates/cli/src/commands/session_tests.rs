// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::exit_error::exit_code;
use cb_core::test_support::{session_with, shell_job};
use cb_core::FakeClock;
use clap::Parser;
use tempfile::TempDir;

#[derive(Parser)]
struct Cli {
    #[command(subcommand)]
    command: SessionCommand,
}

fn stored_session(repo: &SessionRepository) -> SessionId {
    let clock = FakeClock::new();
    let storage = repo.create("smoke-", &clock).unwrap();
    let mut session = session_with(vec![shell_job("t::a", &[])]);
    session.id = storage.id().clone();
    storage.save_session(&session, &clock).unwrap();
    session.id
}

#[yare::parameterized(
    list   = { &["test", "list"] },
    show   = { &["test", "show", "smoke-1"] },
    remove = { &["test", "remove", "smoke-1"] },
)]
fn parses(args: &[&str]) {
    assert!(Cli::try_parse_from(args).is_ok());
}

#[test]
fn show_requires_an_id() {
    assert!(Cli::try_parse_from(["test", "show"]).is_err());
}

#[test]
fn list_and_show_a_stored_session() {
    let tmp = TempDir::new().unwrap();
    let repo = SessionRepository::new(tmp.path());
    let id = stored_session(&repo);

    handle(SessionCommand::List {}, tmp.path(), OutputFormat::Json).unwrap();
    handle(SessionCommand::Show { id: id.to_string() }, tmp.path(), OutputFormat::Text).unwrap();
}

#[test]
fn show_unknown_session_is_internal_error() {
    let tmp = TempDir::new().unwrap();
    let err = handle(SessionCommand::Show { id: "nope".to_string() }, tmp.path(), OutputFormat::Text)
        .unwrap_err();
    assert_eq!(exit_code(&err), 2);
}

#[test]
fn remove_deletes_session_and_clears_its_pointer() {
    let tmp = TempDir::new().unwrap();
    let repo = SessionRepository::new(tmp.path());
    let id = stored_session(&repo);
    repo.set_pointer(&id).unwrap();

    handle(SessionCommand::Remove { id: id.to_string() }, tmp.path(), OutputFormat::Text).unwrap();

    assert!(!repo.exists(&id));
    assert_eq!(repo.pointer(), None);
}

#[test]
fn remove_keeps_pointer_to_another_session() {
    let tmp = TempDir::new().unwrap();
    let repo = SessionRepository::new(tmp.path());
    let id = stored_session(&repo);
    repo.set_pointer(&SessionId::new("other")).unwrap();

    handle(SessionCommand::Remove { id: id.to_string() }, tmp.path(), OutputFormat::Text).unwrap();

    assert_eq!(repo.pointer(), Some(SessionId::new("other")));
}
