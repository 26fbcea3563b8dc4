//! `tokio_util` codec for serial frame streams.
//!
//! Same resynchronization rules as [`FrameReassembler`](crate::reassembler::FrameReassembler),
//! driven by `FramedRead` instead of notification callbacks. No transport header is
//! trimmed; this is the serial byte-stream layout.

use bytes::BytesMut;
use tokio_util::codec::Decoder;
use tracing::debug;

use crate::codec::{Frame, FRAME_LEN};
use crate::error::FrameError;
use crate::reassembler::{next_frame, ReassemblerStats};

/// Decodes 52-byte frames out of an async byte stream.
#[derive(Debug, Default)]
pub struct FrameCodec {
    stats: ReassemblerStats,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> ReassemblerStats {
        self.stats
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        let frame = next_frame(src, &mut self.stats);
        if frame.is_none() {
            src.reserve(FRAME_LEN.saturating_sub(src.len()));
        }
        Ok(frame)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if !src.is_empty() {
            debug!(trailing = src.len(), "dropping partial frame at end of stream");
            src.clear();
        }
        Ok(None)
    }
}
