//! NDJSON transport over in-memory pipes and a real child process.

use std::io;
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use agent_control::transport::codec::MAX_LINE_BYTES;
use agent_control::transport::reader::{run_reader, spawn_reader};
use agent_control::transport::spawner::{spawn_host, SpawnConfig};
use agent_control::transport::writer::NdjsonWriter;
use agent_control::transport::{InboundStreams, Transport};
use agent_control::AppError;

use super::test_helpers::WAIT;

#[tokio::test]
async fn writer_frames_reach_reader_in_order() {
    let (near, far) = tokio::io::duplex(1024);
    let writer = NdjsonWriter::new(near);
    let (mut inbound, handle) = spawn_reader(far, 8, MAX_LINE_BYTES, CancellationToken::new());

    writer.write(json!({ "n": 1 }).to_string()).await.unwrap();
    writer.write(json!({ "n": 2 }).to_string()).await.unwrap();
    drop(writer);

    assert_eq!(inbound.frames.recv().await, Some(json!({ "n": 1 })));
    assert_eq!(inbound.frames.recv().await, Some(json!({ "n": 2 })));
    assert_eq!(inbound.frames.recv().await, None);
    assert_eq!(inbound.errors.recv().await, None, "EOF is not an error");
    handle.await.unwrap();
}

#[tokio::test]
async fn concurrent_writes_never_interleave() {
    // A small pipe forces partial writes.
    let (near, far) = tokio::io::duplex(64);
    let writer = Arc::new(NdjsonWriter::new(near));
    let (mut inbound, _handle) = spawn_reader(far, 64, MAX_LINE_BYTES, CancellationToken::new());

    let mut tasks = Vec::new();
    for n in 0..20 {
        let writer = Arc::clone(&writer);
        tasks.push(tokio::spawn(async move {
            let frame = json!({ "n": n, "padding": "x".repeat(200) });
            writer.write(frame.to_string()).await
        }));
    }

    let mut seen = Vec::new();
    for _ in 0..20 {
        let frame = tokio::time::timeout(WAIT, inbound.frames.recv())
            .await
            .unwrap()
            .expect("every frame parses");
        seen.push(frame["n"].as_u64().unwrap());
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    seen.sort_unstable();
    assert_eq!(seen, (0..20).collect::<Vec<u64>>());
}

#[tokio::test]
async fn reader_skips_malformed_blank_and_oversized_lines() {
    let (mut near, far) = tokio::io::duplex(1024);
    let (mut inbound, handle) = spawn_reader(far, 8, 32, CancellationToken::new());

    let long = format!("{{\"long\":\"{}\"}}", "x".repeat(64));
    let raw = format!("not json\n\n{long}\n{{\"a\":1}}\n   \n{{\"b\":2}}\n");
    near.write_all(raw.as_bytes()).await.unwrap();
    drop(near);

    let mut frames: Vec<Value> = Vec::new();
    while let Some(frame) = inbound.frames.recv().await {
        frames.push(frame);
    }
    assert_eq!(frames, vec![json!({ "a": 1 }), json!({ "b": 2 })]);
    assert_eq!(inbound.errors.recv().await, None);
    handle.await.unwrap();
}

#[tokio::test]
async fn reader_stops_on_cancellation() {
    let (_near, far) = tokio::io::duplex(64);
    let cancel = CancellationToken::new();
    let (mut inbound, handle) = spawn_reader(far, 8, MAX_LINE_BYTES, cancel.clone());

    cancel.cancel();
    tokio::time::timeout(WAIT, handle).await.unwrap().unwrap();
    assert_eq!(inbound.frames.recv().await, None);
}

#[tokio::test]
async fn write_to_closed_pipe_is_transport_error() {
    let (near, far) = tokio::io::duplex(64);
    drop(far);
    let writer = NdjsonWriter::new(near);

    let err = writer.write("{}".into()).await.unwrap_err();
    assert!(matches!(err, AppError::Transport(ref msg) if msg.starts_with("write failed")), "got: {err}");
}

#[tokio::test]
async fn spawning_missing_binary_is_transport_error() {
    let config = SpawnConfig {
        host_cli: "definitely-not-a-real-host-cli-binary".into(),
        host_cli_args: Vec::new(),
        workspace_root: std::env::temp_dir(),
    };

    let err = spawn_host(&config).unwrap_err();
    assert!(
        matches!(err, AppError::Transport(ref msg) if msg.starts_with("failed to spawn host")),
        "got: {err}"
    );
}

#[cfg(unix)]
#[tokio::test]
async fn spawned_host_echoes_frames() {
    let workspace = tempfile::tempdir().unwrap();
    let config = SpawnConfig {
        host_cli: "cat".into(),
        host_cli_args: Vec::new(),
        workspace_root: workspace.path().to_path_buf(),
    };

    let host = spawn_host(&config).unwrap();
    let writer = NdjsonWriter::new(host.stdin);
    let (mut inbound, _handle) = spawn_reader(host.stdout, 8, MAX_LINE_BYTES, CancellationToken::new());

    writer
        .write(json!({ "type": "user", "text": "ping" }).to_string())
        .await
        .unwrap();

    let echoed = tokio::time::timeout(WAIT, inbound.frames.recv()).await.unwrap();
    assert_eq!(echoed, Some(json!({ "type": "user", "text": "ping" })));
    drop(host.child);
}

/// Log sink shared between the subscriber and the test.
#[derive(Clone, Default)]
struct CapturedLog(Arc<Mutex<Vec<u8>>>);

impl io::Write for CapturedLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn skipped_line_is_logged_by_length_only() {
    let log = CapturedLog::default();
    let sink = log.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_ansi(false)
        .with_writer(move || sink.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let (mut near, far) = tokio::io::duplex(4096);
    let garbage = format!("secret-{}", "y".repeat(500));
    near.write_all(format!("{garbage}\n").as_bytes()).await.unwrap();
    drop(near);

    let (senders, mut inbound) = InboundStreams::channel(8);
    run_reader(far, MAX_LINE_BYTES, senders, CancellationToken::new()).await;
    assert_eq!(inbound.frames.recv().await, None);

    let output = String::from_utf8(log.0.lock().unwrap().clone()).unwrap();
    assert!(output.contains("line_bytes=507"), "got: {output}");
    assert!(!output.contains("secret-"), "raw line leaked into the log");
}
