// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use cb_core::JobKind;

fn rec(pairs: &[(&str, &str)]) -> ResourceRecord {
    pairs.iter().copied().collect()
}

fn disk_template(filter: Option<&str>) -> Template {
    let mut job = Job::builder()
        .id("ns::disk/read_{name}")
        .summary("Read test for {name}")
        .command("disk_read --device /dev/{name} --home ${HOME}")
        .depends(vec![JobId::new("ns::disk/detect_{name}")])
        .build();
    job.kind = JobKind::Shell;
    Template {
        id: "ns::disk/read_name".to_string(),
        resource: JobId::new("ns::device"),
        filter: filter.map(str::to_string),
        job,
    }
}

#[yare::parameterized(
    simple       = { "read_{name}",          &[("name", "sda")],               "read_sda" },
    repeated     = { "{a}-{b}-{a}",          &[("a", "1"), ("b", "2")],        "1-2-1" },
    shell_var    = { "echo ${HOME}/{name}",  &[("name", "x"), ("HOME", "no")], "echo ${HOME}/x" },
    no_fields    = { "plain text",           &[],                              "plain text" },
    empty_braces = { "{}",                   &[],                              "{}" },
)]
fn interpolate_cases(template: &str, pairs: &[(&str, &str)], expected: &str) {
    assert_eq!(interpolate(template, &rec(pairs)).unwrap(), expected);
}

#[test]
fn interpolate_reports_missing_key() {
    assert_eq!(interpolate("{name}/{path}", &rec(&[("name", "a")])), Err("path".to_string()));
}

#[test]
fn instantiates_once_per_record() {
    let template = disk_template(None);
    let (jobs, errors) = template.instantiate(&[rec(&[("name", "sda")]), rec(&[("name", "nvme0n1")])]);
    assert!(errors.is_empty());
    let ids: Vec<_> = jobs.iter().map(|j| j.id.as_str()).collect();
    assert_eq!(ids, vec!["ns::disk/read_sda", "ns::disk/read_nvme0n1"]);

    let first = &jobs[0];
    assert_eq!(first.summary, "Read test for sda");
    assert_eq!(first.command.as_deref(), Some("disk_read --device /dev/sda --home ${HOME}"));
    assert_eq!(first.depends, vec![JobId::new("ns::disk/detect_sda")]);
    assert_eq!(first.template_id.as_deref(), Some("ns::disk/read_name"));
}

#[test]
fn filter_skips_records() {
    let template = disk_template(Some("device.category == 'DISK'"));
    let records = [
        rec(&[("name", "sda"), ("category", "DISK")]),
        rec(&[("name", "eth0"), ("category", "NETWORK")]),
    ];
    let (jobs, errors) = template.instantiate(&records);
    assert!(errors.is_empty());
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].id, "ns::disk/read_sda");
}

#[test]
fn bad_filter_instantiates_nothing() {
    let template = disk_template(Some("device.category =="));
    let (jobs, errors) = template.instantiate(&[rec(&[("name", "sda")])]);
    assert!(jobs.is_empty());
    assert!(matches!(errors[0], TemplateError::BadFilter { .. }));
}

#[test]
fn record_missing_field_is_reported_and_skipped() {
    let template = disk_template(None);
    let (jobs, errors) = template.instantiate(&[rec(&[("path", "/dev/sda")]), rec(&[("name", "sdb")])]);
    assert_eq!(jobs.len(), 1);
    assert_eq!(
        errors,
        vec![TemplateError::MissingKey { template: template.id.clone(), key: "name".to_string() }]
    );
}
