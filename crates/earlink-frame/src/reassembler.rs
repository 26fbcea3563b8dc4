use bytes::{Buf, BytesMut};
use tracing::{trace, warn};

use crate::codec::{Frame, ProtocolVersion, FRAME_LEN, START_MARKER};

const INITIAL_BUFFER_CAPACITY: usize = 244 * 5;

/// Running counters for one channel's reassembly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReassemblerStats {
    /// Frames handed out.
    pub frames: u64,
    /// Bytes dropped one at a time while searching for a start marker.
    pub skipped_bytes: u64,
    /// Whole candidates dropped because the end marker did not match.
    pub rejected_frames: u64,
    /// Chunks too short to carry frame data.
    pub ignored_chunks: u64,
}

/// Turns arbitrarily chunked notification payloads into validated frames.
///
/// Resynchronization is asymmetric: a wrong start byte costs one byte, a wrong end
/// byte costs the whole candidate, so bytes already consumed as payload are never
/// rescanned.
#[derive(Debug)]
pub struct FrameReassembler {
    buf: BytesMut,
    version: ProtocolVersion,
    stats: ReassemblerStats,
}

impl FrameReassembler {
    pub fn new(version: ProtocolVersion) -> Self {
        Self {
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            version,
            stats: ReassemblerStats::default(),
        }
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    /// Change the header trim applied to subsequent chunks.
    pub fn set_version(&mut self, version: ProtocolVersion) {
        self.version = version;
    }

    /// Append one notification payload.
    ///
    /// Drops the version's transport header from the head of the chunk first.
    /// Single-byte notifications carry no sample data and are ignored.
    pub fn ingest(&mut self, chunk: &[u8]) {
        if chunk.len() <= 1 {
            self.stats.ignored_chunks += 1;
            trace!(len = chunk.len(), "ignoring short chunk");
            return;
        }

        let trim = self.version.header_trim().min(chunk.len());
        self.buf.extend_from_slice(&chunk[trim..]);
        trace!(len = chunk.len(), trim, pending = self.buf.len(), "ingested chunk");
    }

    /// Drain every complete frame currently buffered.
    ///
    /// The iterator is bounded by what was buffered when it was created; leftover
    /// bytes (fewer than one frame) stay pending for the next chunk.
    pub fn extract_frames(&mut self) -> Frames<'_> {
        Frames { reassembler: self }
    }

    /// Bytes not yet consumed into a frame.
    pub fn pending(&self) -> &[u8] {
        &self.buf
    }

    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }

    pub fn stats(&self) -> ReassemblerStats {
        self.stats
    }

    /// Drop buffered bytes and counters, e.g. when a stream restarts.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.stats = ReassemblerStats::default();
    }

    fn next_frame(&mut self) -> Option<Frame> {
        next_frame(&mut self.buf, &mut self.stats)
    }
}

/// Pull the next valid frame off the head of `buf`, resynchronizing as needed.
pub(crate) fn next_frame(buf: &mut BytesMut, stats: &mut ReassemblerStats) -> Option<Frame> {
    while buf.len() >= FRAME_LEN {
        if buf[0] != START_MARKER {
            buf.advance(1);
            stats.skipped_bytes += 1;
            continue;
        }

        let candidate = buf.split_to(FRAME_LEN);
        match Frame::from_bytes(&candidate) {
            Ok(frame) => {
                stats.frames += 1;
                return Some(frame);
            }
            Err(err) => {
                stats.rejected_frames += 1;
                warn!(%err, "discarding frame candidate");
            }
        }
    }
    None
}

impl Default for FrameReassembler {
    fn default() -> Self {
        Self::new(ProtocolVersion::default())
    }
}

/// Frames drained from a [`FrameReassembler`], in arrival order.
#[derive(Debug)]
pub struct Frames<'a> {
    reassembler: &'a mut FrameReassembler,
}

impl Iterator for Frames<'_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        self.reassembler.next_frame()
    }
}
