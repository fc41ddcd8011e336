// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    shell = { JobKind::Shell, false, false },
    resource = { JobKind::Resource, false, false },
    attachment = { JobKind::Attachment, false, false },
    user_interact = { JobKind::UserInteract, true, false },
    user_verify = { JobKind::UserVerify, false, true },
    user_interact_verify = { JobKind::UserInteractVerify, true, true },
    manual = { JobKind::Manual, true, true },
)]
fn kind_interaction_flags(kind: JobKind, before: bool, verdict: bool) {
    assert_eq!(kind.prompts_before_run(), before);
    assert_eq!(kind.operator_verdict(), verdict);
    assert_eq!(kind.is_interactive(), before || verdict);
}

#[test]
fn kind_serde_uses_kebab_case() {
    let kind: JobKind = serde_json::from_str("\"user-interact-verify\"").unwrap();
    assert_eq!(kind, JobKind::UserInteractVerify);
    assert_eq!(kind.to_string(), "user-interact-verify");
}

#[test]
fn resource_dependencies_are_namespace_qualified_and_deduplicated() {
    let job = Job::builder()
        .id("com.example::gpu/render")
        .requires(vec![
            "device.category == 'VIDEO'".to_string(),
            "device.driver != 'nouveau'".to_string(),
            "package.name == 'mesa-utils'".to_string(),
        ])
        .build();
    assert_eq!(
        job.resource_dependencies().unwrap(),
        vec![JobId::new("com.example::device"), JobId::new("com.example::package")]
    );
}

#[test]
fn hard_dependencies_merge_depends_and_resources() {
    let job = Job::builder()
        .id("ns::x")
        .depends(vec![JobId::new("ns::device"), JobId::new("ns::y")])
        .requires(vec!["device.bus == 'usb'".to_string()])
        .build();
    assert_eq!(job.hard_dependencies(), vec![JobId::new("ns::device"), JobId::new("ns::y")]);
}

#[test]
fn bad_requirement_is_reported() {
    let job = Job::builder().id("ns::x").requires(vec!["device.bus ==".to_string()]).build();
    assert!(job.resource_dependencies().is_err());
    assert!(job.hard_dependencies().is_empty());
}

#[test]
fn job_deserializes_with_defaults() {
    let job: Job = serde_json::from_str(r#"{"id": "ns::x", "kind": "manual"}"#).unwrap();
    assert_eq!(job.kind, JobKind::Manual);
    assert_eq!(job.command, None);
    assert_eq!(job.certification_status, CertificationStatus::Unspecified);
    assert_eq!(job.namespace(), "ns");
}
