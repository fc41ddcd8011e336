// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

fn rec(pairs: &[(&str, &str)]) -> ResourceRecord {
    pairs.iter().copied().collect()
}

fn packages() -> Vec<ResourceRecord> {
    vec![
        rec(&[("name", "fwts"), ("version", "22.01")]),
        rec(&[("name", "stress-ng"), ("version", "0.13")]),
    ]
}

#[parameterized(
    equality = { "package.name == 'fwts'", true },
    equality_double_quotes = { "package.name == \"stress-ng\"", true },
    no_match = { "package.name == 'missing'", false },
    inequality_any_record = { "package.name != 'fwts'", true },
    numeric_compare = { "package.version >= 22", true },
    numeric_not_lexical = { "package.version > 9", true },
    and_same_record = { "package.name == 'fwts' and package.version < 1", false },
    or_clause = { "package.name == 'nope' or package.version == 0.13", true },
    not_clause = { "not package.name == 'fwts'", true },
    in_list = { "package.name in ['a', 'fwts']", true },
    in_tuple = { "package.name in ('a', 'b')", false },
    not_in_list = { "package.name not in ['fwts', 'stress-ng']", false },
    substring = { "'ts' in package.name", true },
    parenthesized = { "(package.name == 'fwts' or package.name == 'x') and package.version == 22.01", true },
    truthy_attr = { "package.name", true },
)]
fn evaluates_against_records(text: &str, expected: bool) {
    let req = Requirement::parse(text).unwrap();
    assert_eq!(req.resource(), "package");
    assert_eq!(req.evaluate(&packages()), expected, "{text}");
}

#[test]
fn missing_attribute_is_false_even_when_negated() {
    let req = Requirement::parse("not package.arch == 'amd64'").unwrap();
    assert!(!req.evaluate(&packages()));
}

#[test]
fn no_records_means_unsatisfied() {
    let req = Requirement::parse("package.name != 'x'").unwrap();
    assert!(!req.evaluate(&[]));
}

#[test]
fn bools_compare_with_python_spelling() {
    let req = Requirement::parse("device.enabled == True").unwrap();
    assert!(req.evaluate(&[rec(&[("enabled", "True")])]));
    assert!(!req.evaluate(&[rec(&[("enabled", "False")])]));
}

#[parameterized(
    empty = { "   " },
    no_resource = { "'a' == 'a'" },
    two_resources = { "cpu.count > 1 and memory.size > 2" },
    dangling_operator = { "cpu.count ==" },
    unterminated = { "cpu.name == 'abc" },
    bare_identifier = { "cpu == 1" },
    single_equals = { "cpu.count = 1" },
    trailing_tokens = { "cpu.count == 1 2" },
)]
fn rejects_bad_expressions(text: &str) {
    assert!(Requirement::parse(text).is_err(), "{text} should not parse");
}

#[test]
fn multiple_resources_error_names_both() {
    let err = Requirement::parse("cpu.count > 1 or memory.size > 2").unwrap_err();
    assert_eq!(
        err,
        ExprError::MultipleResources {
            text: "cpu.count > 1 or memory.size > 2".to_string(),
            first: "cpu".to_string(),
            second: "memory".to_string(),
        }
    );
}

#[test]
fn hyphenated_resource_names() {
    let req = Requirement::parse("dmi-info.vendor == 'ACME'").unwrap();
    assert_eq!(req.resource(), "dmi-info");
    assert!(req.evaluate(&[rec(&[("vendor", "ACME")])]));
}
