use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serialport::SerialPort;
use tracing::{debug, info};

use crate::error::{Result, TransportError};

/// Baud rate the earbud firmware's serial bridge runs at.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Line settings used when opening a serial device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialSettings {
    pub baud_rate: u32,
    /// Applies to reads and writes until changed with `set_read_timeout` / `set_write_timeout`.
    pub timeout: Duration,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            timeout: Duration::from_millis(100),
        }
    }
}

/// A connected byte stream to one earbud. Implements Read + Write.
///
/// Reads may return fewer bytes than requested (a serial line often hands back a
/// single byte per call); callers are expected to loop.
pub struct SerialStream {
    inner: SerialStreamInner,
    label: String,
}

enum SerialStreamInner {
    Port(Box<dyn SerialPort>),
    Capture(File),
    #[cfg(unix)]
    Socket(std::os::unix::net::UnixStream),
}

impl Read for SerialStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            SerialStreamInner::Port(port) => port.read(buf),
            SerialStreamInner::Capture(file) => file.read(buf),
            #[cfg(unix)]
            SerialStreamInner::Socket(stream) => stream.read(buf),
        }
    }
}

impl Write for SerialStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            SerialStreamInner::Port(port) => port.write(buf),
            SerialStreamInner::Capture(file) => file.write(buf),
            #[cfg(unix)]
            SerialStreamInner::Socket(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            SerialStreamInner::Port(port) => port.flush(),
            SerialStreamInner::Capture(file) => file.flush(),
            #[cfg(unix)]
            SerialStreamInner::Socket(stream) => stream.flush(),
        }
    }
}

impl SerialStream {
    /// Open a serial device with the given line settings.
    ///
    /// Reads time out after `settings.timeout`, so a blocked reader gets control back
    /// even when the device goes quiet.
    pub fn open(path: impl AsRef<Path>, settings: &SerialSettings) -> Result<Self> {
        let path = path.as_ref();
        let port = serialport::new(path.to_string_lossy(), settings.baud_rate)
            .timeout(settings.timeout)
            .open()
            .map_err(|err| TransportError::Open {
                path: path.to_path_buf(),
                source: err.into(),
            })?;

        info!(?path, baud_rate = settings.baud_rate, "opened serial device");
        Ok(Self::from_port(port, path.display().to_string()))
    }

    /// Open a file read-only, e.g. a raw capture to replay.
    pub fn open_capture(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| TransportError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(?path, "opened capture file");
        Ok(Self::from_file(file, path))
    }

    /// Wrap an already-open serial port.
    pub fn from_port(port: Box<dyn SerialPort>, label: impl Into<String>) -> Self {
        Self {
            inner: SerialStreamInner::Port(port),
            label: label.into(),
        }
    }

    /// Wrap an already-open capture file.
    pub fn from_file(file: File, path: impl Into<PathBuf>) -> Self {
        Self {
            inner: SerialStreamInner::Capture(file),
            label: path.into().display().to_string(),
        }
    }

    /// Create a connected pair of in-process streams.
    ///
    /// One end plays the device, the other is handed to the reader.
    #[cfg(unix)]
    pub fn pair() -> Result<(Self, Self)> {
        let (left, right) = std::os::unix::net::UnixStream::pair()?;
        Ok((
            Self {
                inner: SerialStreamInner::Socket(left),
                label: "socketpair:0".to_string(),
            },
            Self {
                inner: SerialStreamInner::Socket(right),
                label: "socketpair:1".to_string(),
            },
        ))
    }

    /// Human-readable origin of this stream (device path or socket label).
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Set read timeout on the underlying stream.
    ///
    /// A serial port always carries a timeout, so `None` is rejected there. Capture
    /// files never block and return [`TransportError::Unsupported`].
    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        match &mut self.inner {
            SerialStreamInner::Port(port) => set_port_timeout(port.as_mut(), timeout),
            SerialStreamInner::Capture(_) => Err(TransportError::Unsupported {
                kind: "capture",
                operation: "set_read_timeout",
            }),
            #[cfg(unix)]
            SerialStreamInner::Socket(stream) => {
                stream.set_read_timeout(timeout).map_err(Into::into)
            }
        }
    }

    /// Set write timeout on the underlying stream. Same support rules as reads.
    ///
    /// A serial port has one timeout per handle, shared by reads and writes; give the
    /// reader and the writer their own handles via [`try_clone`](Self::try_clone).
    pub fn set_write_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        match &mut self.inner {
            SerialStreamInner::Port(port) => set_port_timeout(port.as_mut(), timeout),
            SerialStreamInner::Capture(_) => Err(TransportError::Unsupported {
                kind: "capture",
                operation: "set_write_timeout",
            }),
            #[cfg(unix)]
            SerialStreamInner::Socket(stream) => {
                stream.set_write_timeout(timeout).map_err(Into::into)
            }
        }
    }

    /// Try to clone this stream (creates a new file descriptor).
    ///
    /// The reader thread owns one handle while commands are written through the other.
    pub fn try_clone(&self) -> Result<Self> {
        let inner = match &self.inner {
            SerialStreamInner::Port(port) => SerialStreamInner::Port(
                port.try_clone()
                    .map_err(|err| TransportError::Io(err.into()))?,
            ),
            SerialStreamInner::Capture(file) => SerialStreamInner::Capture(file.try_clone()?),
            #[cfg(unix)]
            SerialStreamInner::Socket(stream) => SerialStreamInner::Socket(stream.try_clone()?),
        };
        Ok(Self {
            inner,
            label: self.label.clone(),
        })
    }
}

fn set_port_timeout(port: &mut dyn SerialPort, timeout: Option<Duration>) -> Result<()> {
    let Some(timeout) = timeout else {
        return Err(TransportError::Unsupported {
            kind: "serial port",
            operation: "clear timeout",
        });
    };
    port.set_timeout(timeout)
        .map_err(|err| TransportError::Io(err.into()))
}

impl std::fmt::Debug for SerialStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.inner {
            SerialStreamInner::Port(_) => "port",
            SerialStreamInner::Capture(_) => "capture",
            #[cfg(unix)]
            SerialStreamInner::Socket(_) => "socket",
        };
        f.debug_struct("SerialStream")
            .field("type", &kind)
            .field("label", &self.label)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(unix)]
    fn pair_carries_bytes_both_ways() {
        let (mut device, mut host) = SerialStream::pair().unwrap();

        device.write_all(&[0xA0, 0x01]).unwrap();
        let mut buf = [0u8; 2];
        host.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [0xA0, 0x01]);

        host.write_all(b"b").unwrap();
        let mut cmd = [0u8; 1];
        device.read_exact(&mut cmd).unwrap();
        assert_eq!(&cmd, b"b");
    }

    #[test]
    #[cfg(unix)]
    fn socket_read_timeout_surfaces_would_block() {
        let (_device, mut host) = SerialStream::pair().unwrap();
        host.set_read_timeout(Some(Duration::from_millis(5))).unwrap();

        let mut buf = [0u8; 1];
        let err = host.read(&mut buf).unwrap_err();
        assert!(matches!(
            err.kind(),
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
        ));
    }

    #[test]
    fn open_missing_device_reports_path() {
        let path = std::env::temp_dir().join(format!(
            "earlink-missing-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));

        let err = SerialStream::open(&path, &SerialSettings::default()).unwrap_err();
        match err {
            TransportError::Open { path: reported, .. } => assert_eq!(reported, path),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn capture_streams_reject_read_timeout() {
        let path = std::env::temp_dir().join(format!("earlink-capture-{}", std::process::id()));
        std::fs::write(&path, [0u8; 4]).unwrap();

        let mut stream = SerialStream::open_capture(&path).unwrap();
        let err = stream
            .set_read_timeout(Some(Duration::from_millis(5)))
            .unwrap_err();
        assert!(matches!(err, TransportError::Unsupported { .. }));
        assert!(stream.label().contains("earlink-capture"));

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn clone_shares_label() {
        let path = std::env::temp_dir().join(format!("earlink-clone-{}", std::process::id()));
        std::fs::write(&path, b"@AAVAA-4 ").unwrap();

        let stream = SerialStream::open_capture(&path).unwrap();
        let mut clone = stream.try_clone().unwrap();
        assert_eq!(clone.label(), stream.label());

        let mut text = String::new();
        clone.read_to_string(&mut text).unwrap();
        assert_eq!(text, "@AAVAA-4 ");

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    #[cfg(unix)]
    fn quiet_pty_read_times_out() {
        let (_master, slave) = serialport::TTYPort::pair().unwrap();
        let mut stream = SerialStream::from_port(Box::new(slave), "pty");
        stream
            .set_read_timeout(Some(Duration::from_millis(20)))
            .unwrap();

        let mut buf = [0u8; 1];
        let err = stream.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::TimedOut);
    }

    #[test]
    #[cfg(unix)]
    fn pty_port_rejects_clearing_timeout() {
        let (_master, slave) = serialport::TTYPort::pair().unwrap();
        let mut stream = SerialStream::from_port(Box::new(slave), "pty");
        let err = stream.set_read_timeout(None).unwrap_err();
        assert!(matches!(err, TransportError::Unsupported { .. }));

        let clone = stream.try_clone().unwrap();
        assert_eq!(clone.label(), "pty");
    }

    #[test]
    #[cfg(unix)]
    fn pty_carries_commands_to_device() {
        let (mut master, slave) = serialport::TTYPort::pair().unwrap();
        master.set_timeout(Duration::from_secs(2)).unwrap();
        let mut stream = SerialStream::from_port(Box::new(slave), "pty");

        stream.write_all(b"b").unwrap();
        stream.flush().unwrap();
        let mut cmd = [0u8; 1];
        master.read_exact(&mut cmd).unwrap();
        assert_eq!(&cmd, b"b");
    }
}
