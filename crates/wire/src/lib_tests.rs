// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    identical       = { "0.2.0+abc", "0.2.0+abc", true },
    other_build     = { "0.2.0+abc", "0.2.0+def", true },
    missing_build   = { "0.2.0+abc", "0.2.0",     true },
    other_release   = { "0.2.0+abc", "0.3.0+abc", false },
    empty           = { "0.2.0",     "",          false },
)]
fn version_compatibility(ours: &str, theirs: &str, expected: bool) {
    assert_eq!(compatible(ours, theirs), expected);
}

#[test]
fn only_the_driver_may_prepare_a_rerun() {
    assert!(Request::PrepareRerun { job_ids: vec![] }.mutates());
    assert!(!Request::GetRerunCandidates.mutates());
}

#[test]
fn hello_from_an_agent_without_resume_errors_decodes() {
    let decoded: Response = serde_json::from_str(r#"{"type":"Hello","version":"0.2.0","driver":true}"#).unwrap();
    assert_eq!(decoded, Response::Hello { version: "0.2.0".into(), driver: true, session: None, resume_error: None });
}
