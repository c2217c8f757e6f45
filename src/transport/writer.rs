//! Transport writer.
//!
//! [`NdjsonWriter`] owns the write half of the host stream behind an async
//! mutex so that the outbound issuer and every inbound dispatch task can
//! share one instance. Each frame is encoded as a single `\n`-terminated
//! line and flushed before the lock is released, so concurrent frames never
//! interleave.

use std::future::Future;
use std::pin::Pin;

use futures_util::SinkExt;
use tokio::io::AsyncWrite;
use tokio::sync::Mutex;
use tokio_util::codec::FramedWrite;
use tracing::warn;

use crate::transport::codec::NdjsonCodec;
use crate::transport::Transport;
use crate::{AppError, Result};

/// Serialised NDJSON frame writer over any [`AsyncWrite`] sink.
#[derive(Debug)]
pub struct NdjsonWriter<W> {
    sink: Mutex<FramedWrite<W, NdjsonCodec>>,
}

impl<W> NdjsonWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Wrap `sink` (typically the host's stdin).
    #[must_use]
    pub fn new(sink: W) -> Self {
        Self {
            sink: Mutex::new(FramedWrite::new(sink, NdjsonCodec::new())),
        }
    }
}

impl<W> Transport for NdjsonWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Write `frame` as one NDJSON line and flush it.
    ///
    /// # Errors
    ///
    /// - [`AppError::Transport`]`("write failed: …")` if the sink rejects the
    ///   write (e.g. the host process has exited).
    fn write(&self, frame: String) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let mut sink = self.sink.lock().await;
            sink.send(frame).await.map_err(|e| {
                warn!(error = %e, "transport writer: write failed");
                AppError::Transport(format!("write failed: {e}"))
            })
        })
    }
}
