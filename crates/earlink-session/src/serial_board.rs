//! Pull-model channel: a background thread blocks on serial reads.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use earlink_frame::{
    CommandWriter, DecodeProfile, FrameDecoder, Sample, SampleSink, SerialFrameReader,
    SerialReaderConfig,
};
use earlink_transport::{SerialStream, TransportError};
use tracing::{debug, info, warn};

use crate::channel::{lock, Channel, Side, StatusReport};
use crate::config::SessionConfig;
use crate::error::{Result, SessionError};

/// Outcome of offering a configuration string to a [`GainTracker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GainDecision {
    /// The tracker recorded the change; the command may be written.
    Accepted,
    /// Not a valid configuration command; nothing was recorded.
    Invalid,
}

/// Tracks the amplifier gain the board is configured with.
///
/// Every configuration string goes through [`apply_config`](Self::apply_config)
/// before it is written. If the write then fails, the board calls
/// [`revert_config`](Self::revert_config) so the tracked gain matches the device again.
pub trait GainTracker: Send {
    fn apply_config(&mut self, config: &str) -> GainDecision;
    fn revert_config(&mut self);
}

/// Accepts every configuration and tracks nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughGain;

impl GainTracker for PassthroughGain {
    fn apply_config(&mut self, _config: &str) -> GainDecision {
        GainDecision::Accepted
    }

    fn revert_config(&mut self) {}
}

/// Produces the byte stream when the board is prepared.
pub type StreamOpener = Box<dyn FnMut() -> earlink_transport::Result<SerialStream> + Send>;

type SharedSink = Arc<Mutex<Box<dyn SampleSink>>>;

struct ReaderThread {
    alive: Arc<AtomicBool>,
    handle: JoinHandle<earlink_frame::Result<u64>>,
}

/// A [`Channel`] over a serial byte stream.
///
/// Commands are written from the caller's thread; samples are read and decoded on a
/// dedicated thread between `start` and `stop`.
pub struct SerialBoard<G = PassthroughGain> {
    side: Side,
    opener: StreamOpener,
    tracker: G,
    decoder: FrameDecoder,
    reader_config: SerialReaderConfig,
    write_timeout: Option<Duration>,
    start_command: String,
    stop_command: String,
    writer: Option<CommandWriter<SerialStream>>,
    sink: SharedSink,
    reader: Option<ReaderThread>,
}

impl<G: GainTracker> SerialBoard<G> {
    pub fn new<F>(
        side: Side,
        opener: F,
        tracker: G,
        sink: impl SampleSink + 'static,
        config: &SessionConfig,
    ) -> Result<Self>
    where
        F: FnMut() -> earlink_transport::Result<SerialStream> + Send + 'static,
    {
        let decoder = FrameDecoder::new(config.layout.clone(), DecodeProfile::serial())?;
        Ok(Self {
            side,
            opener: Box::new(opener),
            tracker,
            decoder,
            reader_config: SerialReaderConfig {
                close_on_eof: false,
                read_timeout: config.serial_read_timeout(),
            },
            write_timeout: config.serial_write_timeout(),
            start_command: config.start_command.clone(),
            stop_command: config.stop_command.clone(),
            writer: None,
            sink: Arc::new(Mutex::new(Box::new(sink))),
            reader: None,
        })
    }

    pub fn tracker(&self) -> &G {
        &self.tracker
    }

    pub fn is_prepared(&self) -> bool {
        self.writer.is_some()
    }

    /// Whether a reader thread exists and has not exited on its own.
    fn reader_running(&self) -> bool {
        self.reader
            .as_ref()
            .is_some_and(|reader| !reader.handle.is_finished())
    }

    fn writer(&mut self) -> Result<&mut CommandWriter<SerialStream>> {
        self.writer.as_mut().ok_or(SessionError::BoardNotCreated)
    }

    fn spawn_reader(&mut self) -> Result<()> {
        let writer = self.writer()?;
        let stream = writer.get_ref().try_clone()?;
        let mut reader = SerialFrameReader::with_config_stream(
            stream,
            self.decoder.clone(),
            self.reader_config.clone(),
        )?;

        let alive = Arc::new(AtomicBool::new(true));
        let thread_alive = Arc::clone(&alive);
        let sink = Arc::clone(&self.sink);
        let side = self.side;

        let handle = std::thread::Builder::new()
            .name(format!("earlink-serial-{side}"))
            .spawn(move || {
                let mut push = |sample: Sample| lock(&sink).push(sample);
                let result = reader.run(&thread_alive, &mut push);
                if let Err(err) = &result {
                    warn!(%side, %err, "serial reader stopped on error");
                }
                result
            })
            .map_err(TransportError::from)?;

        self.reader = Some(ReaderThread { alive, handle });
        Ok(())
    }

    fn join_reader(&mut self) -> Result<()> {
        let Some(reader) = self.reader.take() else {
            return Ok(());
        };
        reader.alive.store(false, Ordering::Release);
        match reader.handle.join() {
            Ok(Ok(delivered)) => {
                debug!(side = %self.side, delivered, "serial reader joined");
                Ok(())
            }
            Ok(Err(err)) => {
                debug!(side = %self.side, %err, "serial reader had already failed");
                Ok(())
            }
            Err(_) => Err(SessionError::Reader(format!("{} reader panicked", self.side))),
        }
    }
}

impl SerialBoard<PassthroughGain> {
    /// Board that opens the serial device at `path` on `prepare`, with the baud rate and
    /// read timeout from `config`.
    pub fn open_path(
        side: Side,
        path: impl Into<PathBuf>,
        sink: impl SampleSink + 'static,
        config: &SessionConfig,
    ) -> Result<Self> {
        let path = path.into();
        let settings = config.serial_settings();
        Self::new(
            side,
            move || SerialStream::open(&path, &settings),
            PassthroughGain,
            sink,
            config,
        )
    }
}

impl<G: GainTracker> Channel for SerialBoard<G> {
    fn side(&self) -> Side {
        self.side
    }

    fn prepare(&mut self) -> Result<()> {
        if self.writer.is_some() {
            return Ok(());
        }
        let stream = (self.opener)()?;
        info!(side = %self.side, stream = stream.label(), "serial board prepared");
        self.writer = Some(CommandWriter::with_timeout(stream, self.write_timeout)?);
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        let command = self.start_command.clone();
        self.writer()?;
        if self.reader_running() {
            return Err(SessionError::StreamAlreadyRunning);
        }
        // A reader that died on an I/O error is reaped so streaming can restart.
        self.join_reader()?;

        self.writer()?.send(&command)?;
        self.spawn_reader()?;
        info!(side = %self.side, "serial stream started");
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let command = self.stop_command.clone();
        let written = match self.writer.as_mut() {
            Some(writer) => writer.send(&command).map_err(SessionError::from),
            None => Ok(()),
        };
        self.join_reader()?;
        written?;
        info!(side = %self.side, "serial stream stopped");
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        self.join_reader()?;
        if self.writer.take().is_some() {
            info!(side = %self.side, "serial board released");
        }
        Ok(())
    }

    fn send_command(&mut self, command: &str) -> Result<()> {
        let writer = self.writer()?;
        if command.is_empty() {
            return Err(SessionError::InvalidArguments("empty command".to_string()));
        }
        writer.send(command)?;
        Ok(())
    }

    fn config_board(&mut self, config: &str) -> Result<()> {
        self.writer()?;
        if config.is_empty() {
            return Err(SessionError::InvalidArguments("empty config".to_string()));
        }
        if self.tracker.apply_config(config) == GainDecision::Invalid {
            return Err(SessionError::InvalidArguments(format!(
                "unrecognized config command {config:?}"
            )));
        }

        if let Err(err) = self.writer()?.send(config) {
            self.tracker.revert_config();
            warn!(side = %self.side, %err, "config write failed, gain reverted");
            return Err(err.into());
        }
        Ok(())
    }

    fn take_status(&mut self) -> Option<StatusReport> {
        None
    }

    fn is_streaming(&self) -> bool {
        self.reader_running()
    }
}

impl<G> Drop for SerialBoard<G> {
    fn drop(&mut self) {
        if let Some(reader) = &self.reader {
            reader.alive.store(false, Ordering::Release);
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::io::{Read, Write};
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

    use earlink_frame::{encode_frame, FrameFields};

    use super::*;

    /// Accepts `x...` gain commands, rejects everything else, counts reverts.
    #[derive(Default)]
    struct CountingGain {
        applied: usize,
        reverts: Arc<AtomicUsize>,
    }

    impl GainTracker for CountingGain {
        fn apply_config(&mut self, config: &str) -> GainDecision {
            if config.starts_with('x') {
                self.applied += 1;
                GainDecision::Accepted
            } else {
                GainDecision::Invalid
            }
        }

        fn revert_config(&mut self) {
            self.applied -= 1;
            self.reverts.fetch_add(1, Ordering::SeqCst);
        }
    }

    type Collected = Arc<Mutex<Vec<Sample>>>;

    fn board<G: GainTracker>(tracker: G) -> (SerialBoard<G>, SerialStream, Collected) {
        let (host, device) = SerialStream::pair().unwrap();
        let mut host = Some(host);
        let samples = Arc::new(Mutex::new(Vec::new()));
        let out = Arc::clone(&samples);
        let config = SessionConfig {
            serial_read_timeout_ms: Some(10),
            ..SessionConfig::default()
        };

        let board = SerialBoard::new(
            Side::Right,
            move || host.take().ok_or(TransportError::Closed),
            tracker,
            move |sample: Sample| lock(&out).push(sample),
            &config,
        )
        .unwrap();
        (board, device, samples)
    }

    fn read_command(device: &mut SerialStream) -> u8 {
        let mut byte = [0u8; 1];
        device.read_exact(&mut byte).unwrap();
        byte[0]
    }

    fn wait_for(samples: &Collected, count: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while lock(samples).len() < count {
            assert!(Instant::now() < deadline, "timed out waiting for samples");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn streams_frames_between_start_and_stop() {
        let (mut board, mut device, samples) = board(PassthroughGain);
        board.prepare().unwrap();
        board.start().unwrap();
        assert!(board.is_streaming());
        assert_eq!(read_command(&mut device), b'b');

        device.write_all(&[0x13, 0x37]).unwrap();
        for n in 0..3u8 {
            let wire = encode_frame(&FrameFields {
                package_number: n,
                device_timestamp: 250,
                detection: [12, -7],
                ..FrameFields::default()
            });
            device.write_all(&wire).unwrap();
        }
        wait_for(&samples, 3);

        board.stop().unwrap();
        assert!(!board.is_streaming());
        assert_eq!(read_command(&mut device), b'9');

        let samples = lock(&samples);
        assert_eq!(samples[2].get(0), 2.0);
        assert_eq!(samples[0].get(14), 12.0);
        assert_eq!(samples[0].get(15), -7.0);
        assert_eq!(samples[0].get(17), 250.0);
    }

    #[test]
    fn start_before_prepare_fails() {
        let (mut board, _device, _) = board(PassthroughGain);
        assert!(matches!(board.start(), Err(SessionError::BoardNotCreated)));
        assert!(matches!(
            board.send_command("b"),
            Err(SessionError::BoardNotCreated)
        ));
    }

    #[test]
    fn second_start_is_rejected() {
        let (mut board, _device, _) = board(PassthroughGain);
        board.prepare().unwrap();
        board.start().unwrap();
        assert!(matches!(
            board.start(),
            Err(SessionError::StreamAlreadyRunning)
        ));
        board.release().unwrap();
        assert!(!board.is_prepared());
    }

    #[test]
    fn invalid_config_is_not_written() {
        let (mut board, mut device, _) = board(CountingGain::default());
        board.prepare().unwrap();

        let err = board.config_board("zzz").unwrap_err();
        assert!(matches!(err, SessionError::InvalidArguments(_)));

        board.config_board("x1").unwrap();
        assert_eq!(board.tracker().applied, 1);
        let mut written = [0u8; 2];
        device.read_exact(&mut written).unwrap();
        assert_eq!(&written, b"x1");
    }

    #[test]
    fn failed_config_write_reverts_gain() {
        let tracker = CountingGain::default();
        let reverts = Arc::clone(&tracker.reverts);
        let (mut board, device, _) = board(tracker);
        board.prepare().unwrap();
        drop(device);

        assert!(board.config_board("x2").is_err());
        assert_eq!(reverts.load(Ordering::SeqCst), 1);
        assert_eq!(board.tracker().applied, 0);
    }

    #[test]
    fn stop_without_prepare_is_ok() {
        let (mut board, _device, _) = board(PassthroughGain);
        board.stop().unwrap();
        board.release().unwrap();
    }

    fn pty_board() -> (SerialBoard, serialport::TTYPort) {
        let (master, slave) = serialport::TTYPort::pair().unwrap();
        let mut slave = Some(SerialStream::from_port(Box::new(slave), "pty"));
        let config = SessionConfig {
            serial_read_timeout_ms: Some(10),
            ..SessionConfig::default()
        };
        let board = SerialBoard::new(
            Side::Left,
            move || slave.take().ok_or(TransportError::Closed),
            PassthroughGain,
            |_: Sample| {},
            &config,
        )
        .unwrap();
        (board, master)
    }

    #[test]
    fn stop_returns_while_device_is_quiet() {
        let (mut board, _master) = pty_board();
        board.prepare().unwrap();
        board.start().unwrap();

        let (done_tx, done_rx) = std::sync::mpsc::channel();
        let stopper = std::thread::spawn(move || {
            let stopped = board.stop();
            let released = board.release();
            let _ = done_tx.send(stopped.is_ok() && released.is_ok());
        });

        let outcome = done_rx.recv_timeout(Duration::from_secs(3));
        assert_eq!(outcome, Ok(true), "stop should not wait on a silent device");
        stopper.join().unwrap();
    }

    #[test]
    fn reader_exit_on_io_error_ends_streaming() {
        let (mut board, master) = pty_board();
        board.prepare().unwrap();
        board.start().unwrap();
        assert!(board.is_streaming());

        drop(master);
        let deadline = Instant::now() + Duration::from_secs(3);
        while board.is_streaming() {
            assert!(Instant::now() < deadline, "reader should exit once the device hangs up");
            std::thread::sleep(Duration::from_millis(5));
        }

        let restarted = board.start();
        assert!(!matches!(restarted, Err(SessionError::StreamAlreadyRunning)));
    }
}
