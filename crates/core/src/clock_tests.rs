// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn system_clock_returns_increasing_time() {
    let clock = SystemClock;
    let t1 = clock.now();
    std::thread::sleep(Duration::from_millis(1));
    let t2 = clock.now();
    assert!(t2 > t1);
}

#[test]
fn fake_clock_is_cloneable_and_shared() {
    let clock1 = FakeClock::new();
    let clock2 = clock1.clone();
    let t1 = clock1.now();
    let ms = clock1.epoch_ms();
    clock2.advance(Duration::from_secs(30));
    assert!(clock1.now().duration_since(t1) >= Duration::from_secs(30));
    assert_eq!(clock1.epoch_ms(), ms + 30_000);
}

#[test]
fn fake_clock_utc_tracks_epoch() {
    let clock = FakeClock::new();
    assert_eq!(clock.utc().to_rfc3339(), "2026-01-02T03:04:05+00:00");
    clock.set_epoch_ms(0);
    assert_eq!(clock.utc().timestamp(), 0);
}
