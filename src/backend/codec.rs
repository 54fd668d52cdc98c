//! NDJSON codec for backend process streams.
//!
//! Wraps [`tokio_util::codec::LinesCodec`] with a fixed maximum line
//! length to prevent memory exhaustion caused by unterminated or
//! maliciously large messages from a misbehaving backend process.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use crate::{AppError, Result};

/// Maximum line length accepted by the event codec: 1 MiB.
///
/// Longer inbound lines cause [`EventCodec::decode`] to return
/// [`AppError::Backend`] with `"line too long"` instead of allocating.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// NDJSON codec for backend process stdout.
///
/// Delegates line-framing to [`LinesCodec`] with the fixed
/// [`MAX_LINE_BYTES`] limit. Each newline-terminated UTF-8 string is one
/// complete backend message.
#[derive(Debug)]
pub struct EventCodec(LinesCodec);

impl EventCodec {
    /// Create a new `EventCodec` with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self(LinesCodec::new_with_max_length(MAX_LINE_BYTES))
    }
}

impl Default for EventCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for EventCodec {
    type Item = String;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.0.decode(src).map_err(map_codec_error)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.0.decode_eof(src).map_err(map_codec_error)
    }
}

impl Encoder<String> for EventCodec {
    type Error = AppError;

    /// Encode `item` as a `\n`-terminated NDJSON line into `dst`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`] on underlying I/O failures.
    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<()> {
        // The max-length limit is a decoder-side concern only.
        self.0.encode(item, dst).map_err(map_codec_error)
    }
}

/// Map a [`LinesCodecError`] to an [`AppError`].
fn map_codec_error(e: LinesCodecError) -> AppError {
    match e {
        LinesCodecError::MaxLineLengthExceeded => {
            AppError::Backend(format!("line too long: exceeded {MAX_LINE_BYTES} bytes"))
        }
        LinesCodecError::Io(io_err) => AppError::Io(io_err.to_string()),
    }
}
