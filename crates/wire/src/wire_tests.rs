// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire format tests: length-prefix framing and JSON encoding.

use super::*;
use crate::{Request, Response};
use std::time::Duration;

#[test]
fn encode_returns_json_without_length_prefix() {
    let encoded = encode(&Response::Ok).expect("encode failed");

    let json_str = std::str::from_utf8(&encoded).expect("should be valid UTF-8");
    assert_eq!(json_str, r#"{"type":"Ok"}"#);
}

#[tokio::test]
async fn write_message_adds_length_prefix() {
    let data = b"test data";

    let mut buffer = Vec::new();
    write_message(&mut buffer, data).await.expect("write failed");

    let len = u32::from_be_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]) as usize;
    assert_eq!(len, data.len());
    assert_eq!(&buffer[4..], data);
}

#[tokio::test]
async fn frames_read_back_in_order() {
    let mut buffer = Vec::new();
    write_frame(&mut buffer, &Request::Ping, Duration::from_secs(1)).await.unwrap();
    write_frame(&mut buffer, &Request::GetNextJob, Duration::from_secs(1)).await.unwrap();

    let mut cursor = std::io::Cursor::new(buffer);
    let first: Request = read_frame(&mut cursor, None).await.unwrap();
    let second: Request = read_frame(&mut cursor, None).await.unwrap();
    assert_eq!(first, Request::Ping);
    assert_eq!(second, Request::GetNextJob);

    let end = read_frame::<Request, _>(&mut cursor, None).await.unwrap_err();
    assert!(matches!(end, ProtocolError::ConnectionClosed));
}

#[tokio::test]
async fn truncated_payload_is_connection_closed() {
    let mut buffer = Vec::new();
    write_message(&mut buffer, b"0123456789").await.unwrap();
    buffer.truncate(8);

    let err = read_message(&mut std::io::Cursor::new(buffer)).await.unwrap_err();
    assert!(matches!(err, ProtocolError::ConnectionClosed));
}

#[tokio::test]
async fn oversized_prefix_is_rejected_before_reading() {
    let buffer = u32::MAX.to_be_bytes().to_vec();
    let err = read_message(&mut std::io::Cursor::new(buffer)).await.unwrap_err();
    assert!(matches!(err, ProtocolError::TooLarge { .. }));
}

#[tokio::test]
async fn silent_peer_times_out() {
    let (mut client, _server) = tokio::io::duplex(64);
    let err = read_frame::<Response, _>(&mut client, Some(Duration::from_millis(20)))
        .await
        .unwrap_err();
    assert!(matches!(err, ProtocolError::Timeout));
}

#[test]
fn garbage_is_a_json_error() {
    assert!(matches!(decode::<Request>(b"{\"type\":\"Nope\"}"), Err(ProtocolError::Json(_))));
}
