// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    exact = { "ns", "disk/read", "ns::disk/read", true },
    anchored_start = { "ns", "read", "ns::disk/read", false },
    anchored_end = { "ns", "disk", "ns::disk/read", false },
    wildcard = { "ns", "disk/.*", "ns::disk/read", true },
    other_namespace = { "ns", "disk/.*", "other::disk/read", false },
    explicit_namespace = { "ns", "other::disk/.*", "other::disk/read", true },
    dotted_namespace_is_literal = { "com.example", "cpu", "comXexample::cpu", false },
    alternation_stays_anchored = { "ns", "a|b", "ns::b", true },
)]
fn id_pattern_matching(namespace: &str, pattern: &str, id: &str, expected: bool) {
    assert_eq!(IdPattern::new(namespace, pattern).unwrap().matches(id), expected);
}

#[test]
fn id_pattern_rejects_bad_regex() {
    assert!(IdPattern::new("ns", "disk/(").is_err());
}

#[test]
fn include_entry_parses_inline_override() {
    let entry = IncludeEntry::parse("disk/.* certification-status=blocker").unwrap();
    assert_eq!(entry.pattern, "disk/.*");
    assert_eq!(entry.certification_status, Some(CertificationStatus::Blocker));

    let plain = IncludeEntry::parse("  cpu/clock  ").unwrap();
    assert_eq!(plain.certification_status, None);
}

#[parameterized(
    empty = { "" },
    unknown_status = { "x certification-status=critical" },
    unknown_field = { "x priority=high" },
)]
fn include_entry_rejects(line: &str) {
    assert!(IncludeEntry::parse(line).is_err());
}

#[test]
fn bootstrap_ids_are_qualified() {
    let plan = TestPlan {
        id: "ns::smoke".to_string(),
        name: String::new(),
        include: vec![],
        mandatory_include: vec![],
        bootstrap_include: vec!["device".to_string(), "other::package".to_string()],
        exclude: vec![],
        nested_part: vec![],
        certification_status_overrides: vec![],
    };
    assert_eq!(plan.namespace(), "ns");
    assert_eq!(plan.bootstrap_ids(), vec![JobId::new("ns::device"), JobId::new("other::package")]);
}
