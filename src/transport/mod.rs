//! Newline-delimited JSON byte transport.
//!
//! The control plane only depends on the [`Transport`] write seam and the
//! two inbound queues in [`InboundStreams`]. The submodules provide the
//! concrete NDJSON implementation used by the binary:
//!
//! - `codec`: [`LinesCodec`](tokio_util::codec::LinesCodec)-based framing with a line cap.
//! - `reader`: read task turning lines into JSON frames plus a fatal-error queue.
//! - `writer`: serialised frame writer implementing [`Transport`].
//! - `spawner`: host CLI process spawning with environment isolation.

pub mod codec;
pub mod reader;
pub mod spawner;
pub mod writer;

use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::{AppError, Result};

/// Write side of the byte transport.
///
/// Implementations must accept concurrent callers and write each frame
/// whole; the issuer and the inbound dispatch tasks share one instance.
pub trait Transport: Send + Sync {
    /// Write one serialised JSON frame (without trailing newline).
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Transport`] if the underlying stream is closed or
    /// the write fails.
    fn write(&self, frame: String) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Read side of the byte transport: parsed frames plus a parallel error queue.
///
/// The producer reports at most one error and then closes both queues.
#[derive(Debug)]
pub struct InboundStreams {
    /// Parsed inbound JSON frames in emission order.
    pub frames: mpsc::Receiver<Value>,
    /// Fatal read errors.
    pub errors: mpsc::Receiver<AppError>,
}

impl InboundStreams {
    /// Create a connected sender pair and the matching [`InboundStreams`].
    #[must_use]
    pub fn channel(capacity: usize) -> (InboundSenders, Self) {
        let (frame_tx, frames) = mpsc::channel(capacity);
        let (error_tx, errors) = mpsc::channel(1);
        (
            InboundSenders {
                frames: frame_tx,
                errors: error_tx,
            },
            Self { frames, errors },
        )
    }
}

/// Producer half of [`InboundStreams`].
#[derive(Debug, Clone)]
pub struct InboundSenders {
    /// Frame producer.
    pub frames: mpsc::Sender<Value>,
    /// Fatal-error producer.
    pub errors: mpsc::Sender<AppError>,
}
