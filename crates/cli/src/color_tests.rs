// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serial_test::serial;

fn force_color() {
    std::env::set_var("COLOR", "1");
    std::env::remove_var("NO_COLOR");
}

fn no_color() {
    std::env::set_var("NO_COLOR", "1");
    std::env::remove_var("COLOR");
}

#[test]
#[serial]
fn styles_returns_styled_when_color_forced() {
    force_color();
    let debug = format!("{:?}", styles());
    assert_ne!(debug, format!("{:?}", Styles::plain()));
}

#[test]
#[serial]
fn styles_returns_plain_when_no_color() {
    no_color();
    let debug = format!("{:?}", styles());
    assert_eq!(debug, format!("{:?}", Styles::plain()));
}

#[test]
#[serial]
fn header_produces_ansi_when_color_forced() {
    force_color();
    let result = header("foo");
    assert!(result.contains("\x1b[38;5;74m"), "expected ANSI header color");
    assert!(result.contains("foo"));
    assert!(result.ends_with("\x1b[0m"), "expected ANSI reset");
}

#[test]
#[serial]
fn outcome_colors_follow_severity() {
    force_color();
    let cases = [
        (Outcome::Pass, codes::PASS),
        (Outcome::Fail, codes::FAIL),
        (Outcome::Crash, codes::FAIL),
        (Outcome::Skip, codes::WARN),
        (Outcome::NotSupported, codes::WARN),
        (Outcome::Undecided, codes::MUTED),
    ];
    for (value, code) in cases {
        let result = outcome(value);
        assert!(result.starts_with(&format!("\x1b[38;5;{code}m")), "{value}: {result:?}");
        assert!(result.contains(&value.to_string()));
    }
}

#[test]
#[serial]
fn helpers_plain_when_no_color() {
    no_color();
    assert_eq!(header("foo"), "foo");
    assert_eq!(literal("bar"), "bar");
    assert_eq!(context("baz"), "baz");
    assert_eq!(muted("dim"), "dim");
    assert_eq!(outcome(Outcome::NotSupported), "not-supported");
}

#[test]
#[serial]
fn should_colorize_respects_no_color() {
    std::env::set_var("NO_COLOR", "1");
    std::env::set_var("COLOR", "1");
    assert!(!should_colorize(), "NO_COLOR=1 should override COLOR=1");
}
