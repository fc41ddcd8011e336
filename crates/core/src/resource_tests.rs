// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn parses_blank_line_separated_records() {
    let out = "name: fwts\nversion: 22.01\n\nname: stress-ng\nversion: 0.13\n";
    let parsed = parse_records(out);
    assert_eq!(parsed.dropped, 0);
    assert_eq!(parsed.records.len(), 2);
    assert_eq!(parsed.records[0].get("name"), Some("fwts"));
    assert_eq!(parsed.records[1].get("version"), Some("0.13"));
}

#[test]
fn continuation_lines_extend_previous_value() {
    let out = "description: first line\n  second line\nstate: ok\n";
    let parsed = parse_records(out);
    assert_eq!(parsed.records.len(), 1);
    assert_eq!(parsed.records[0].get("description"), Some("first line\nsecond line"));
    assert_eq!(parsed.records[0].get("state"), Some("ok"));
}

#[test]
fn value_may_contain_colons() {
    let parsed = parse_records("path: /dev/disk/by-id/usb-0:1\n");
    assert_eq!(parsed.records[0].get("path"), Some("/dev/disk/by-id/usb-0:1"));
}

#[test]
fn malformed_record_is_dropped_not_fatal() {
    let out = "name: good\n\nthis is garbage\nname: bad\n\nname: also-good\n";
    let parsed = parse_records(out);
    assert_eq!(parsed.dropped, 1);
    let names: Vec<_> = parsed.records.iter().filter_map(|r| r.get("name")).collect();
    assert_eq!(names, vec!["good", "also-good"]);
}

#[test]
fn leading_continuation_is_malformed() {
    let parsed = parse_records("   orphan\nkey: v\n");
    assert!(parsed.records.is_empty());
    assert_eq!(parsed.dropped, 1);
}

#[test]
fn empty_output_has_no_records() {
    assert_eq!(parse_records(""), ParsedResources::default());
    assert_eq!(parse_records("\n\n  \n"), ParsedResources::default());
}

#[test]
fn record_serializes_as_plain_map() {
    let record: ResourceRecord = [("a", "1")].into_iter().collect();
    assert_eq!(serde_json::to_string(&record).unwrap(), r#"{"a":"1"}"#);
}

#[test]
fn rendered_records_parse_back() {
    let records = parse_records("name: sda\nmodel: Disk\n  rev 2\n\nname: sdb\n").records;
    let text = render_records(&records);
    assert_eq!(text, "model: Disk\n  rev 2\nname: sda\n\nname: sdb\n");
    assert_eq!(parse_records(&text).records, records);
}
