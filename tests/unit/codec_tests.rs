//! Unit tests for the NDJSON codec and line parsing.

use bytes::BytesMut;
use serde_json::json;
use tokio_util::codec::{Decoder, Encoder};

use agent_control::transport::codec::{NdjsonCodec, MAX_LINE_BYTES};
use agent_control::transport::reader::parse_line;
use agent_control::AppError;

#[test]
fn single_line_decodes_without_newline() {
    let mut codec = NdjsonCodec::new();
    let mut buf = BytesMut::from("{\"type\":\"assistant\"}\n");

    let line = codec.decode(&mut buf).expect("decode must succeed");
    assert_eq!(line, Some("{\"type\":\"assistant\"}".to_owned()));
}

#[test]
fn batched_lines_decode_one_at_a_time() {
    let mut codec = NdjsonCodec::new();
    let mut buf = BytesMut::from("{\"a\":1}\n{\"b\":2}\n");

    assert_eq!(codec.decode(&mut buf).unwrap(), Some("{\"a\":1}".to_owned()));
    assert_eq!(codec.decode(&mut buf).unwrap(), Some("{\"b\":2}".to_owned()));
    assert_eq!(codec.decode(&mut buf).unwrap(), None);
}

#[test]
fn partial_line_is_buffered_until_newline() {
    let mut codec = NdjsonCodec::new();
    let mut buf = BytesMut::from("{\"type\":");
    assert_eq!(codec.decode(&mut buf).unwrap(), None);

    buf.extend_from_slice(b"\"result\"}\n");
    assert_eq!(
        codec.decode(&mut buf).unwrap(),
        Some("{\"type\":\"result\"}".to_owned())
    );
}

#[test]
fn over_long_line_is_a_protocol_error() {
    let mut codec = NdjsonCodec::with_max_line_bytes(16);
    let mut buf = BytesMut::from(format!("{}\n", "x".repeat(64)).as_str());

    let err = codec.decode(&mut buf).expect_err("line exceeds the limit");
    assert!(
        matches!(err, AppError::Protocol(ref msg) if msg.contains("line too long")),
        "unexpected error: {err}"
    );
}

#[test]
fn default_limit_is_one_mebibyte() {
    assert_eq!(MAX_LINE_BYTES, 1_048_576);
}

#[test]
fn encoder_appends_newline() {
    let mut codec = NdjsonCodec::new();
    let mut dst = BytesMut::new();
    codec
        .encode("{\"type\":\"control_request\"}".to_owned(), &mut dst)
        .unwrap();
    assert_eq!(&dst[..], b"{\"type\":\"control_request\"}\n");
}

#[test]
fn parse_line_skips_blank_lines() {
    assert_eq!(parse_line("   ").unwrap(), None);
    assert_eq!(parse_line("").unwrap(), None);
}

#[test]
fn parse_line_returns_json_value() {
    let frame = parse_line("{\"type\":\"system\",\"n\":1}").unwrap();
    assert_eq!(frame, Some(json!({"type": "system", "n": 1})));
}

#[test]
fn parse_line_rejects_malformed_json() {
    let err = parse_line("{not json").unwrap_err();
    assert!(matches!(err, AppError::Protocol(ref msg) if msg.starts_with("malformed json")));
}
