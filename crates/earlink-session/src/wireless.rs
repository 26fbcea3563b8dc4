//! Push-model channel: the wireless link delivers notification chunks to a callback.
//!
//! The link itself (pairing, GATT subscription, characteristic writes) lives outside
//! this crate behind [`WirelessLink`]. What the link calls back into is a
//! [`NotificationHandler`], which owns the per-channel reassembly state.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use earlink_frame::{
    DecodeProfile, DeviceStatus, FrameDecoder, FrameReassembler, ReassemblerStats, SampleSink,
};
use tracing::{debug, info, trace};

use crate::channel::{lock, take_report, Channel, Side, StatusReport};
use crate::config::SessionConfig;
use crate::error::{Result, SessionError};

/// Connection to one earbud over the wireless transport.
pub trait WirelessLink: Send {
    /// Connect to the device.
    fn open(&mut self) -> Result<()>;

    /// Route every notification payload to `handler` until [`unsubscribe`](Self::unsubscribe).
    fn subscribe(&mut self, handler: NotificationHandler) -> Result<()>;

    /// Write a command to the device's command characteristic.
    fn write_command(&mut self, command: &[u8]) -> Result<()>;

    fn unsubscribe(&mut self) -> Result<()>;

    /// Disconnect from the device.
    fn close(&mut self) -> Result<()>;
}

struct Pipeline {
    reassembler: FrameReassembler,
    decoder: FrameDecoder,
    sink: Box<dyn SampleSink>,
    delivered: u64,
}

struct Shared {
    side: Side,
    streaming: AtomicBool,
    status: Mutex<DeviceStatus>,
    pipeline: Mutex<Pipeline>,
}

/// Per-channel notification callback target.
///
/// Cheap to clone; every clone feeds the same channel state. Never performs I/O.
#[derive(Clone)]
pub struct NotificationHandler {
    shared: Arc<Shared>,
}

impl NotificationHandler {
    fn new(
        side: Side,
        status: DeviceStatus,
        decoder: FrameDecoder,
        sink: Box<dyn SampleSink>,
    ) -> Self {
        let version = status.protocol_version();
        Self {
            shared: Arc::new(Shared {
                side,
                streaming: AtomicBool::new(false),
                status: Mutex::new(status),
                pipeline: Mutex::new(Pipeline {
                    reassembler: FrameReassembler::new(version),
                    decoder,
                    sink,
                    delivered: 0,
                }),
            }),
        }
    }

    /// Handle one notification payload.
    ///
    /// Before streaming, payloads are status candidates; while streaming they are
    /// sample data.
    pub fn on_notification(&self, chunk: &[u8]) {
        if !self.shared.streaming.load(Ordering::Acquire) {
            if !lock(&self.shared.status).apply(chunk) {
                trace!(
                    side = %self.shared.side,
                    len = chunk.len(),
                    "dropping pre-stream payload"
                );
            }
            return;
        }

        let mut pipeline = lock(&self.shared.pipeline);
        let Pipeline {
            reassembler,
            decoder,
            sink,
            delivered,
        } = &mut *pipeline;

        reassembler.ingest(chunk);
        for frame in reassembler.extract_frames() {
            sink.push(decoder.decode(&frame));
            *delivered += 1;
        }
    }

    pub fn side(&self) -> Side {
        self.shared.side
    }

    pub fn is_streaming(&self) -> bool {
        self.shared.streaming.load(Ordering::Acquire)
    }

    /// Raw protocol version last reported by the device.
    pub fn reported_version(&self) -> i32 {
        lock(&self.shared.status).version()
    }

    /// Samples handed to the sink since the channel was created.
    pub fn samples_delivered(&self) -> u64 {
        lock(&self.shared.pipeline).delivered
    }

    pub fn reassembler_stats(&self) -> ReassemblerStats {
        lock(&self.shared.pipeline).reassembler.stats()
    }

    /// Lock in the reported protocol version and start routing payloads to the reassembler.
    fn begin_streaming(&self) {
        let version = lock(&self.shared.status).protocol_version();
        {
            let mut pipeline = lock(&self.shared.pipeline);
            pipeline.reassembler.reset();
            pipeline.reassembler.set_version(version);
            pipeline.decoder.set_profile(DecodeProfile::wireless(version));
        }
        self.shared.streaming.store(true, Ordering::Release);
        debug!(side = %self.shared.side, ?version, "streaming enabled");
    }

    fn end_streaming(&self) {
        self.shared.streaming.store(false, Ordering::Release);
    }

    fn take_status(&self) -> Option<StatusReport> {
        take_report(self.shared.side, &self.shared.status)
    }
}

impl fmt::Debug for NotificationHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationHandler")
            .field("side", &self.shared.side)
            .field("streaming", &self.is_streaming())
            .finish_non_exhaustive()
    }
}

/// A [`Channel`] backed by a [`WirelessLink`].
pub struct WirelessChannel<L> {
    link: L,
    handler: NotificationHandler,
    start_command: String,
    stop_command: String,
    opened: bool,
    subscribed: bool,
}

impl<L: WirelessLink> WirelessChannel<L> {
    /// Create a channel decoding with the layout and policies from `config`.
    pub fn new(
        side: Side,
        link: L,
        sink: impl SampleSink + 'static,
        config: &SessionConfig,
    ) -> Result<Self> {
        let status = DeviceStatus::new(config.version_policy);
        let profile = DecodeProfile::wireless(status.protocol_version());
        let decoder = FrameDecoder::new(config.layout.clone(), profile)?;
        Ok(Self::with_decoder(side, link, decoder, Box::new(sink), config))
    }

    /// Create a channel with an explicit decoder (e.g. one with a custom clock).
    pub fn with_decoder(
        side: Side,
        link: L,
        decoder: FrameDecoder,
        sink: Box<dyn SampleSink>,
        config: &SessionConfig,
    ) -> Self {
        let status = DeviceStatus::new(config.version_policy);
        Self {
            link,
            handler: NotificationHandler::new(side, status, decoder, sink),
            start_command: config.start_command.clone(),
            stop_command: config.stop_command.clone(),
            opened: false,
            subscribed: false,
        }
    }

    /// A handle for the link's notification callback.
    pub fn handler(&self) -> NotificationHandler {
        self.handler.clone()
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    fn ensure_prepared(&self) -> Result<()> {
        if self.opened && self.subscribed {
            Ok(())
        } else {
            Err(SessionError::BoardNotCreated)
        }
    }
}

impl<L: WirelessLink> Channel for WirelessChannel<L> {
    fn side(&self) -> Side {
        self.handler.side()
    }

    fn prepare(&mut self) -> Result<()> {
        if !self.opened {
            self.link.open()?;
            self.opened = true;
        }
        if !self.subscribed {
            self.link.subscribe(self.handler.clone())?;
            self.subscribed = true;
        }
        info!(side = %self.side(), "wireless channel prepared");
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        self.ensure_prepared()?;
        if self.handler.is_streaming() {
            return Err(SessionError::StreamAlreadyRunning);
        }

        self.handler.begin_streaming();
        if let Err(err) = self.link.write_command(self.start_command.as_bytes()) {
            self.handler.end_streaming();
            return Err(err);
        }
        info!(side = %self.side(), "wireless stream started");
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if !self.opened {
            self.handler.end_streaming();
            debug!(side = %self.side(), "stop on closed channel");
            return Ok(());
        }

        self.link.write_command(self.stop_command.as_bytes())?;
        self.handler.end_streaming();
        info!(side = %self.side(), "wireless stream stopped");
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        self.handler.end_streaming();
        if self.subscribed {
            self.link.unsubscribe()?;
            self.subscribed = false;
        }
        if self.opened {
            self.link.close()?;
            self.opened = false;
            info!(side = %self.side(), "wireless channel released");
        }
        Ok(())
    }

    fn send_command(&mut self, command: &str) -> Result<()> {
        self.ensure_prepared()?;
        if command.is_empty() {
            return Err(SessionError::InvalidArguments("empty command".to_string()));
        }
        debug!(side = %self.side(), command, "writing command");
        self.link.write_command(command.as_bytes())
    }

    fn take_status(&mut self) -> Option<StatusReport> {
        self.handler.take_status()
    }

    fn is_streaming(&self) -> bool {
        self.handler.is_streaming()
    }
}
