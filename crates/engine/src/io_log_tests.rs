// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tempfile::TempDir;

fn line(t: f64, stream: Stream, text: &str) -> IoLine {
    IoLine { elapsed_secs: t, stream, line: text.to_string() }
}

#[test]
fn writes_json_lines() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("io-logs/job.log");
    let mut writer = IoLogWriter::create(&path);
    writer.write(&line(0.0, Stream::Stdout, "hello"));
    writer.write(&line(0.5, Stream::Stderr, "oops"));
    writer.finish();

    let raw = std::fs::read_to_string(&path).unwrap();
    let first: serde_json::Value = serde_json::from_str(raw.lines().next().unwrap()).unwrap();
    assert_eq!(first, serde_json::json!({ "t": 0.0, "stream": "stdout", "line": "hello" }));

    let read = read_io_log(&path).unwrap();
    assert_eq!(read, vec![line(0.0, Stream::Stdout, "hello"), line(0.5, Stream::Stderr, "oops")]);
}

#[test]
fn unwritable_path_is_tolerated() {
    let tmp = TempDir::new().unwrap();
    let blocker = tmp.path().join("file");
    std::fs::write(&blocker, "").unwrap();
    let mut writer = IoLogWriter::create(&blocker.join("job.log"));
    writer.write(&line(0.0, Stream::Stdout, "dropped"));
    writer.finish();
}

#[test]
fn reader_skips_garbage() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("job.log");
    std::fs::write(&path, "not json\n{\"t\":1.0,\"stream\":\"stdout\",\"line\":\"ok\"}\n").unwrap();
    assert_eq!(read_io_log(&path).unwrap(), vec![line(1.0, Stream::Stdout, "ok")]);
}
