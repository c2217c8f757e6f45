//! Transport reader task.
//!
//! Reads newline-delimited JSON from the host's stdout, parses each line
//! into a [`serde_json::Value`], and forwards frames through a tokio
//! [`mpsc`] channel. A fatal read error is pushed once onto the parallel
//! error channel, after which both channels close.
//!
//! The reader is driven by [`FramedRead`] backed by [`NdjsonCodec`], which
//! enforces the per-line limit before any heap allocation for JSON parsing.

use futures_util::StreamExt;
use serde_json::Value;
use tokio::io::AsyncRead;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::transport::codec::NdjsonCodec;
use crate::transport::{InboundSenders, InboundStreams};
use crate::{AppError, Result};

/// Parse a single NDJSON line into a frame.
///
/// # Return value
///
/// - `Ok(Some(frame))`: the line holds a JSON value.
/// - `Ok(None)`: the line is empty or whitespace.
///
/// # Errors
///
/// Returns [`AppError::Protocol`]`("malformed json: …")` when the line is not
/// valid JSON.
pub fn parse_line(line: &str) -> Result<Option<Value>> {
    if line.trim().is_empty() {
        return Ok(None);
    }

    serde_json::from_str(line)
        .map(Some)
        .map_err(|e| AppError::Protocol(format!("malformed json: {e}")))
}

/// Spawn the reader task over `source` and return its output streams.
///
/// Malformed lines and over-long lines are logged and skipped; they do
/// **not** terminate the reader. An I/O error is reported once on
/// [`InboundStreams::errors`] and ends the task. EOF and cancellation end
/// the task without an error.
pub fn spawn_reader<R>(
    source: R,
    capacity: usize,
    max_line_bytes: usize,
    cancel: CancellationToken,
) -> (InboundStreams, JoinHandle<()>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (senders, streams) = InboundStreams::channel(capacity);
    let handle = tokio::spawn(run_reader(source, max_line_bytes, senders, cancel));
    (streams, handle)
}

/// Reader loop; see [`spawn_reader`].
pub async fn run_reader<R>(
    source: R,
    max_line_bytes: usize,
    senders: InboundSenders,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(source, NdjsonCodec::with_max_line_bytes(max_line_bytes));
    // FramedRead yields one `None` after a decoder error before it resumes.
    let mut resuming = false;

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!("transport reader: cancellation received, stopping");
                break;
            }

            item = framed.next() => {
                match item {
                    None if resuming => resuming = false,

                    None => {
                        debug!("transport reader: EOF detected");
                        break;
                    }

                    Some(Err(e)) if !e.is_fatal() => {
                        warn!(error = %e, "transport reader: framing error, skipping");
                        resuming = true;
                    }

                    Some(Err(e)) => {
                        warn!(error = %e, "transport reader: read failed, stopping");
                        if senders.errors.send(e).await.is_err() {
                            debug!("transport reader: error channel closed before report");
                        }
                        break;
                    }

                    Some(Ok(line)) => match parse_line(&line) {
                        Ok(Some(frame)) => {
                            if senders.frames.send(frame).await.is_err() {
                                debug!("transport reader: frame channel closed, stopping");
                                break;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            warn!(error = %e, line_bytes = line.len(), "transport reader: parse error, skipping line");
                        }
                    },
                }
            }
        }
    }
}
