// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use cb_core::test_support::shell_job;
use cb_core::{JobKind, JobResult, Outcome};

fn start_prompt() -> Prompt {
    Prompt::start(shell_job("t::a", &[]))
}

fn verdict_prompt() -> Prompt {
    Prompt::verdict(shell_job("t::a", &[]), JobResult::new(Outcome::Undecided).with_return_code(0))
}

#[yare::parameterized(
    letter = { "r", Verb::Run, None },
    word = { "skip", Verb::Skip, None },
    upper = { "Q", Verb::Quit, None },
    padded = { "  run  ", Verb::Run, None },
    comment = { "c no camera attached", Verb::Comment, Some("no camera attached") },
    skip_with_note = { "s later", Verb::Skip, Some("later") },
)]
fn parses_start_choices(input: &str, verb: Verb, comment: Option<&str>) {
    let choice = parse_choice(input, &start_prompt()).unwrap();
    assert_eq!(choice.verb, verb);
    assert_eq!(choice.comment.as_deref(), comment);
}

#[yare::parameterized(
    empty = { "" },
    unknown = { "x" },
    verdict_at_start = { "pass" },
    comment_without_text = { "c" },
)]
fn rejects_bad_start_input(input: &str) {
    assert!(parse_choice(input, &start_prompt()).is_err());
}

#[test]
fn verdict_prompt_refuses_run_but_allows_quit() {
    let prompt = verdict_prompt();
    assert!(parse_choice("r", &prompt).is_err());
    assert_eq!(parse_choice("q", &prompt).unwrap(), Choice::new(Verb::Quit));
    assert_eq!(parse_choice("f wrong colour", &prompt).unwrap(), Choice::with_comment(Verb::Fail, "wrong colour"));
}

#[test]
fn menu_lists_prompt_choices() {
    assert_eq!(choice_menu(&start_prompt()), "[r]un [s]kip [c]omment [q]uit");
    let manual = Prompt::start(cb_core::Job::new("t::m", JobKind::Manual));
    assert_eq!(choice_menu(&manual), "[p]ass [f]ail [s]kip [c]omment [q]uit");
}

#[tokio::test]
async fn choose_reprompts_until_valid() {
    let mut ui = TerminalInteraction::new(&b"nonsense\nc\nc cable missing\n"[..]);
    let choice = ui.choose(&start_prompt()).await;
    assert_eq!(choice, Choice::with_comment(Verb::Comment, "cable missing"));
}

#[tokio::test]
async fn end_of_input_quits() {
    let mut ui = TerminalInteraction::new(&b""[..]);
    assert_eq!(ui.choose(&start_prompt()).await, Choice::new(Verb::Quit));
}

#[tokio::test]
async fn end_of_input_at_verdict_quits() {
    let mut ui = TerminalInteraction::new(&b""[..]);
    assert_eq!(ui.choose(&verdict_prompt()).await, Choice::new(Verb::Quit));
}

#[tokio::test]
async fn end_of_input_without_quit_takes_default() {
    let mut prompt = verdict_prompt();
    prompt.choices.retain(|v| *v != Verb::Quit);
    let mut ui = TerminalInteraction::new(&b""[..]);
    let choice = ui.choose(&prompt).await;
    assert_eq!(choice.verb, Verb::Skip);
    assert_eq!(choice.comment_text(), Some("no operator input"));
}

#[tokio::test]
async fn crash_decision_defaults_to_keep() {
    let job = JobId::new("t::a");
    let mut yes = TerminalInteraction::new(&b"y\n"[..]);
    assert_eq!(yes.decide_crash(&job, 1, true).await, CrashDecision::Rerun);

    let mut blank = TerminalInteraction::new(&b"\n"[..]);
    assert_eq!(blank.decide_crash(&job, 1, true).await, CrashDecision::Keep);

    let mut exhausted = TerminalInteraction::new(&b"y\n"[..]);
    assert_eq!(exhausted.decide_crash(&job, 3, false).await, CrashDecision::Keep);
}

#[yare::parameterized(
    blank = { "", vec![] },
    none = { "n", vec![] },
    all = { "all", vec![0, 1, 2] },
    listed = { "3, 1", vec![2, 0] },
    repeated = { "2 2", vec![1] },
)]
fn parses_rerun_selection(input: &str, expected: Vec<usize>) {
    assert_eq!(parse_rerun_selection(input, 3).unwrap(), expected);
}

#[yare::parameterized(
    zero = { "0" },
    past_end = { "4" },
    word = { "first" },
)]
fn rejects_bad_rerun_selection(input: &str) {
    assert!(parse_rerun_selection(input, 3).is_err());
}

#[tokio::test]
async fn choose_reruns_maps_numbers_to_jobs() {
    let jobs = vec![shell_job("t::a", &[]), shell_job("t::b", &[])];
    let mut ui = TerminalInteraction::new(&b"7\n2\n"[..]);
    assert_eq!(ui.choose_reruns(&jobs).await, vec![JobId::new("t::b")]);

    let mut closed = TerminalInteraction::new(&b""[..]);
    assert!(closed.choose_reruns(&jobs).await.is_empty());
}

#[tokio::test]
async fn confirm_needs_an_explicit_yes() {
    assert!(TerminalInteraction::new(&b"yes\n"[..]).confirm("start?").await);
    assert!(!TerminalInteraction::new(&b"sure\n"[..]).confirm("start?").await);
    assert!(!TerminalInteraction::new(&b""[..]).confirm("start?").await);
}
