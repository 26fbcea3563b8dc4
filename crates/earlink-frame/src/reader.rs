use std::io::{ErrorKind, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use earlink_transport::{SerialStream, TransportError};
use tracing::{debug, trace, warn};

use crate::codec::{Frame, FRAME_LEN, START_MARKER};
use crate::decode::{DecodeProfile, FrameDecoder};
use crate::error::{FrameError, Result};
use crate::layout::ChannelLayout;
use crate::sample::SampleSink;

/// Options for the blocking serial reader.
#[derive(Debug, Clone)]
pub struct SerialReaderConfig {
    /// Treat a zero-length read as end of stream. Off for live devices, where a
    /// zero-length read only means nothing arrived yet; on for capture replay.
    pub close_on_eof: bool,
    /// Read timeout applied to streams that support one, so the liveness flag is
    /// rechecked even when the device goes quiet.
    pub read_timeout: Option<Duration>,
}

impl Default for SerialReaderConfig {
    fn default() -> Self {
        Self {
            close_on_eof: false,
            read_timeout: Some(Duration::from_millis(100)),
        }
    }
}

/// Reads and decodes frames from a blocking byte stream.
///
/// Scans one byte at a time for the start marker, then accumulates the rest of the
/// frame across however many short reads it takes. Cancellation is cooperative: the
/// liveness flag is checked before every read, including mid-frame.
pub struct SerialFrameReader<T> {
    inner: T,
    decoder: FrameDecoder,
    config: SerialReaderConfig,
    skipped_bytes: u64,
    rejected_frames: u64,
}

impl<T: Read> SerialFrameReader<T> {
    /// Create a reader decoding with the serial transport's constants.
    pub fn new(inner: T, layout: ChannelLayout) -> Result<Self> {
        let decoder = FrameDecoder::new(layout, DecodeProfile::serial())?;
        Ok(Self::with_decoder(inner, decoder, SerialReaderConfig::default()))
    }

    /// Create a reader with an explicit decoder and configuration.
    pub fn with_decoder(inner: T, decoder: FrameDecoder, config: SerialReaderConfig) -> Self {
        Self {
            inner,
            decoder,
            config,
            skipped_bytes: 0,
            rejected_frames: 0,
        }
    }

    /// Read the next valid frame (blocking).
    ///
    /// Returns `Ok(None)` once `alive` is cleared, even in the middle of a frame.
    pub fn read_frame(&mut self, alive: &AtomicBool) -> Result<Option<Frame>> {
        let mut buf = [0u8; FRAME_LEN];

        'scan: loop {
            if !alive.load(Ordering::Acquire) {
                return Ok(None);
            }

            if self.read_some(&mut buf[..1])? != 1 {
                trace!("unable to read 1 byte");
                continue;
            }
            if buf[0] != START_MARKER {
                self.skipped_bytes += 1;
                continue;
            }

            let mut pos = 1;
            while pos < FRAME_LEN {
                if !alive.load(Ordering::Acquire) {
                    return Ok(None);
                }
                pos += self.read_some(&mut buf[pos..])?;
            }

            match Frame::from_bytes(&buf) {
                Ok(frame) => return Ok(Some(frame)),
                Err(err) => {
                    self.rejected_frames += 1;
                    warn!(%err, "discarding serial frame");
                    continue 'scan;
                }
            }
        }
    }

    /// Decode frames into `sink` until `alive` is cleared.
    ///
    /// Returns the number of samples delivered.
    pub fn run<S: SampleSink + ?Sized>(
        &mut self,
        alive: &AtomicBool,
        sink: &mut S,
    ) -> Result<u64> {
        let mut delivered = 0u64;
        while let Some(frame) = self.read_frame(alive)? {
            sink.push(self.decoder.decode(&frame));
            delivered += 1;
        }
        debug!(
            delivered,
            skipped_bytes = self.skipped_bytes,
            rejected_frames = self.rejected_frames,
            "serial reader stopped"
        );
        Ok(delivered)
    }

    /// One read call; interrupted and timed-out reads count as zero bytes.
    fn read_some(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.inner.read(buf) {
            Ok(0) if self.config.close_on_eof => Err(FrameError::ConnectionClosed),
            Ok(n) => Ok(n),
            Err(err)
                if matches!(
                    err.kind(),
                    ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut
                ) =>
            {
                Ok(0)
            }
            Err(err) => Err(FrameError::Io(err)),
        }
    }

    pub fn decoder(&self) -> &FrameDecoder {
        &self.decoder
    }

    /// Bytes discarded while scanning for a start marker.
    pub fn skipped_bytes(&self) -> u64 {
        self.skipped_bytes
    }

    /// Frames discarded because of a bad end marker.
    pub fn rejected_frames(&self) -> u64 {
        self.rejected_frames
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current reader configuration.
    pub fn config(&self) -> &SerialReaderConfig {
        &self.config
    }
}

impl SerialFrameReader<SerialStream> {
    /// Create a reader for a `SerialStream` and apply the read timeout from config.
    ///
    /// Capture files have no timeout to set and are read as they are.
    pub fn with_config_stream(
        mut inner: SerialStream,
        decoder: FrameDecoder,
        config: SerialReaderConfig,
    ) -> Result<Self> {
        match inner.set_read_timeout(config.read_timeout) {
            Ok(()) => {}
            Err(TransportError::Unsupported { kind, .. }) => {
                debug!(stream = inner.label(), kind, "read timeout not supported");
            }
            Err(err) => return Err(transport_to_frame_error(err)),
        }
        Ok(Self::with_decoder(inner, decoder, config))
    }
}

fn transport_to_frame_error(err: TransportError) -> FrameError {
    match err {
        TransportError::Io(io) => FrameError::Io(io),
        TransportError::Open { source, .. } => FrameError::Io(source),
        TransportError::Closed => FrameError::ConnectionClosed,
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}
