// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::fs;
use tempfile::TempDir;

const BASIC: &str = r#"
namespace = "com.example"

[[job]]
id = "device"
kind = "resource"
command = "udev_resource"

[[job]]
id = "disk/detect"
command = "lsblk"
depends = ["device"]
requires = ["device.category == 'DISK'"]
imports = { pkg = "other::package" }
certification_status = "blocker"
timeout = 30

[[job]]
id = "manual/lid"
kind = "manual"
summary = "Close the lid"

[[template]]
template_resource = "device"
template_filter = "device.category == 'DISK'"
id = "disk/read_{name}"
command = "disk_read /dev/{name}"

[[test_plan]]
id = "smoke"
name = "Smoke"
include = ["disk/.* certification-status=non-blocker", "manual/lid"]
bootstrap_include = ["device"]
nested_part = ["extra"]

[[test_plan.certification_status_overrides]]
pattern = "manual/.*"
status = "blocker"
"#;

#[test]
fn parses_jobs_with_qualified_ids() {
    let mut set = ProviderSet::new();
    set.add_provider_str(BASIC, "basic.toml").unwrap();

    let ids: Vec<_> = set.jobs().keys().map(|k| k.as_str()).collect();
    assert_eq!(ids, vec!["com.example::device", "com.example::disk/detect", "com.example::manual/lid"]);

    let detect = set.job(&JobId::new("com.example::disk/detect")).unwrap();
    assert_eq!(detect.kind, JobKind::Shell);
    assert_eq!(detect.depends, vec![JobId::new("com.example::device")]);
    assert_eq!(detect.imports["pkg"], JobId::new("other::package"));
    assert_eq!(detect.certification_status, CertificationStatus::Blocker);
    assert_eq!(detect.timeout, Some(30));
    assert_eq!(detect.origin.as_deref(), Some("basic.toml"));
}

#[test]
fn parses_templates_and_plans() {
    let mut set = ProviderSet::new();
    set.add_provider_str(BASIC, "basic.toml").unwrap();

    let template = &set.templates()[0];
    assert_eq!(template.id, "com.example::disk/read_{name}");
    assert_eq!(template.resource, JobId::new("com.example::device"));
    assert_eq!(template.filter.as_deref(), Some("device.category == 'DISK'"));

    let plan = set.test_plan("smoke").unwrap();
    assert_eq!(plan.id, "com.example::smoke");
    assert_eq!(plan.include[0].certification_status, Some(CertificationStatus::NonBlocker));
    assert_eq!(plan.nested_part, vec!["com.example::extra".to_string()]);
    assert_eq!(plan.certification_status_overrides[0].status, CertificationStatus::Blocker);
    assert!(set.test_plan("com.example::smoke").is_some());
    assert!(set.test_plan("missing").is_none());
}

#[test]
fn partial_plan_lookup_must_be_unambiguous() {
    let mut set = ProviderSet::new();
    set.add_provider_str("namespace = \"a\"\n[[test_plan]]\nid = \"full\"\n", "a.toml").unwrap();
    set.add_provider_str("namespace = \"b\"\n[[test_plan]]\nid = \"full\"\n", "b.toml").unwrap();
    assert!(set.test_plan("full").is_none());
    assert!(set.test_plan("b::full").is_some());
}

#[test]
fn non_manual_job_needs_command() {
    let mut set = ProviderSet::new();
    let err = set.add_provider_str("namespace = \"n\"\n[[job]]\nid = \"x\"\n", "x.toml").unwrap_err();
    assert!(matches!(err, LoadError::MissingCommand(id) if id == "n::x"));
    assert!(set.jobs().is_empty());
}

#[test]
fn duplicate_job_across_files_is_an_error() {
    let content = "namespace = \"n\"\n[[job]]\nid = \"x\"\ncommand = \"true\"\n";
    let mut set = ProviderSet::new();
    set.add_provider_str(content, "first.toml").unwrap();
    let err = set.add_provider_str(content, "second.toml").unwrap_err();
    assert!(
        matches!(err, LoadError::DuplicateJob { ref first, ref second, .. } if first == "first.toml" && second == "second.toml")
    );
}

#[test]
fn duplicate_job_within_file_is_an_error() {
    let content = "namespace = \"n\"\n[[job]]\nid = \"x\"\ncommand = \"a\"\n[[job]]\nid = \"x\"\ncommand = \"b\"\n";
    let err = ProviderSet::new().add_provider_str(content, "f.toml").unwrap_err();
    assert!(matches!(err, LoadError::DuplicateJob { .. }));
}

#[test]
fn load_skips_unparseable_files() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("good.toml"), BASIC).unwrap();
    fs::write(tmp.path().join("bad.toml"), "namespace = [").unwrap();

    let set = ProviderSet::load(&[tmp.path().to_path_buf()]).unwrap();
    assert_eq!(set.jobs().len(), 3);
    assert_eq!(set.skipped().len(), 1);
    assert!(set.skipped()[0].0.ends_with("bad.toml"));
}

#[test]
fn hash_changes_with_definitions() {
    let mut a = ProviderSet::new();
    a.add_provider_str(BASIC, "basic.toml").unwrap();
    let mut b = ProviderSet::new();
    b.add_provider_str(BASIC, "basic.toml").unwrap();
    assert_eq!(a.hash(), b.hash());
    assert_eq!(a.hash().len(), 64);

    b.add_job(Job::builder().id("com.example::extra").build()).unwrap();
    assert_ne!(a.hash(), b.hash());
}
