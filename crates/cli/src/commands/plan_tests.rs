// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::exit_error::exit_code;
use clap::Parser;
use serial_test::serial;
use tempfile::TempDir;

#[derive(Parser)]
struct Cli {
    #[command(subcommand)]
    command: PlanCommand,
}

const PROVIDER: &str = r#"
namespace = "t"

[[job]]
id = "a"
command = "true"

[[job]]
id = "b"
command = "true"
depends = ["a"]

[[test_plan]]
id = "smoke"
name = "Smoke"
include = ["b"]
"#;

fn state_dir() -> TempDir {
    std::env::remove_var("CB_PROVIDERS");
    let tmp = TempDir::new().unwrap();
    std::fs::create_dir_all(tmp.path().join("providers")).unwrap();
    std::fs::write(tmp.path().join("providers/t.toml"), PROVIDER).unwrap();
    tmp
}

#[test]
fn parse_list_subcommand() {
    let cli = Cli::try_parse_from(["test", "list"]).unwrap();
    assert!(matches!(cli.command, PlanCommand::List {}));
}

#[test]
fn parse_resolve_with_selection() {
    let cli = Cli::try_parse_from(["test", "resolve", "t::smoke", "-x", "t::a", "--match", "t::b.*"]).unwrap();
    let PlanCommand::Resolve { plan, selection } = cli.command else { panic!("expected resolve") };
    assert_eq!(plan, "t::smoke");
    let selection = selection.into_selection();
    assert_eq!(selection.exclude, vec!["t::a"]);
    assert_eq!(selection.matching, vec!["t::b.*"]);
    assert!(selection.include.is_empty());
}

#[test]
#[serial]
fn resolve_and_list_known_plan() {
    let tmp = state_dir();
    let resolve = PlanCommand::Resolve { plan: "t::smoke".to_string(), selection: SelectionArgs::default() };
    handle(resolve, tmp.path(), OutputFormat::Json).unwrap();
    handle(PlanCommand::List {}, tmp.path(), OutputFormat::Text).unwrap();
}

#[test]
#[serial]
fn empty_selection_exits_with_internal_error() {
    let tmp = state_dir();
    let selection = SelectionArgs { exclude: vec!["t::.*".to_string()], ..Default::default() };
    let err = handle(PlanCommand::Resolve { plan: "t::smoke".to_string(), selection }, tmp.path(), OutputFormat::Text)
        .unwrap_err();
    assert_eq!(exit_code(&err), 2);
}

#[test]
#[serial]
fn unknown_plan_is_an_error() {
    let tmp = state_dir();
    let resolve = PlanCommand::Resolve { plan: "t::nope".to_string(), selection: SelectionArgs::default() };
    let err = handle(resolve, tmp.path(), OutputFormat::Text).unwrap_err();
    assert!(err.to_string().contains("t::nope"), "{err}");
}
