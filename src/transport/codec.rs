//! NDJSON codec for the host CLI stream.
//!
//! Wraps [`tokio_util::codec::LinesCodec`] with a configurable maximum line
//! length so an unterminated or oversized message from a misbehaving host
//! cannot exhaust memory.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use crate::{AppError, Result};

/// Default maximum line length accepted by the codec: 1 MiB.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// NDJSON codec for the bidirectional host stream.
///
/// Each newline-terminated (`\n`) UTF-8 string is one complete frame.
///
/// # Decoder
///
/// Inbound lines longer than the configured limit return
/// [`AppError::Protocol`]`("line too long: …")` rather than allocating.
/// I/O errors are mapped to [`AppError::Transport`].
///
/// # Encoder
///
/// Outbound strings are encoded as `item\n`. The limit is a decoder-side
/// concern and is not enforced during encoding.
#[derive(Debug)]
pub struct NdjsonCodec {
    inner: LinesCodec,
    max_line_bytes: usize,
}

impl NdjsonCodec {
    /// Create a codec with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_line_bytes(MAX_LINE_BYTES)
    }

    /// Create a codec with a custom line limit.
    #[must_use]
    pub fn with_max_line_bytes(max_line_bytes: usize) -> Self {
        Self {
            inner: LinesCodec::new_with_max_length(max_line_bytes),
            max_line_bytes,
        }
    }

    fn map_error(&self, err: LinesCodecError) -> AppError {
        match err {
            LinesCodecError::MaxLineLengthExceeded => AppError::Protocol(format!(
                "line too long: exceeded {} bytes",
                self.max_line_bytes
            )),
            LinesCodecError::Io(io_err) => AppError::Transport(io_err.to_string()),
        }
    }
}

impl Default for NdjsonCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for NdjsonCodec {
    type Item = String;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.inner.decode(src).map_err(|e| self.map_error(e))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.inner.decode_eof(src).map_err(|e| self.map_error(e))
    }
}

impl Encoder<String> for NdjsonCodec {
    type Error = AppError;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<()> {
        self.inner.encode(item, dst).map_err(|e| self.map_error(e))
    }
}
