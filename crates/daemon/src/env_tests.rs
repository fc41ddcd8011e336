// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serial_test::serial;

#[test]
#[serial]
fn state_dir_prefers_explicit_override() {
    std::env::set_var("CB_STATE_DIR", "/tmp/cb-state");
    std::env::set_var("XDG_STATE_HOME", "/tmp/xdg");

    assert_eq!(state_dir().unwrap(), PathBuf::from("/tmp/cb-state"));

    std::env::remove_var("CB_STATE_DIR");
    assert_eq!(state_dir().unwrap(), PathBuf::from("/tmp/xdg/certbench"));
    std::env::remove_var("XDG_STATE_HOME");
}

#[test]
#[serial]
fn provider_dirs_split_on_colons() {
    std::env::set_var("CB_PROVIDERS", "/a::/b");
    assert_eq!(
        provider_dirs(Path::new("/state")),
        vec![PathBuf::from("/a"), PathBuf::from("/b")]
    );

    std::env::remove_var("CB_PROVIDERS");
    assert_eq!(provider_dirs(Path::new("/state")), vec![PathBuf::from("/state/providers")]);
}

#[test]
#[serial]
fn numeric_settings_fall_back_on_garbage() {
    std::env::set_var("CB_PORT", "not-a-port");
    std::env::set_var("CB_MAX_ATTEMPTS", "0");
    std::env::set_var("CB_JOB_TIMEOUT_SECS", "0");
    std::env::set_var("CB_KILL_GRACE_MS", "250");

    assert_eq!(port(), cb_wire::DEFAULT_PORT);
    assert_eq!(max_attempts(), 3);
    assert_eq!(job_timeout(), None);
    assert_eq!(kill_grace(), Duration::from_millis(250));

    for var in ["CB_PORT", "CB_MAX_ATTEMPTS", "CB_JOB_TIMEOUT_SECS", "CB_KILL_GRACE_MS"] {
        std::env::remove_var(var);
    }
}

#[test]
#[serial]
fn empty_token_means_no_auth() {
    std::env::set_var("CB_AUTH_TOKEN", "");
    assert_eq!(auth_token(), None);
    std::env::set_var("CB_AUTH_TOKEN", "s3cret");
    assert_eq!(auth_token().as_deref(), Some("s3cret"));
    std::env::remove_var("CB_AUTH_TOKEN");
}

#[yare::parameterized(
    one   = { "1",     true },
    word  = { "TRUE",  true },
    on    = { " on ",  true },
    no    = { "no",    false },
    zero  = { "0",     false },
)]
fn auto_retry_values(value: &str, expected: bool) {
    assert_eq!(truthy(value), expected);
}
