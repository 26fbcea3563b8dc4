use std::io::{ErrorKind, Write};
use std::time::Duration;

use earlink_transport::{SerialStream, TransportError};
use tracing::{debug, trace};

use crate::error::{FrameError, Result};

/// Writes device commands to any `Write` stream.
///
/// Commands are short ASCII strings (`"b"`, `"9"`, `"w..."`). Every command is written
/// in full and flushed before `send` returns.
pub struct CommandWriter<T> {
    inner: T,
    commands_sent: u64,
}

impl<T: Write> CommandWriter<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            commands_sent: 0,
        }
    }

    /// Write one command (blocking).
    pub fn send(&mut self, command: &str) -> Result<()> {
        self.send_bytes(command.as_bytes())
    }

    /// Write raw command bytes (blocking).
    pub fn send_bytes(&mut self, command: &[u8]) -> Result<()> {
        let mut offset = 0usize;
        while offset < command.len() {
            match self.inner.write(&command[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()?;
        self.commands_sent += 1;
        trace!(len = command.len(), "command written");
        Ok(())
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Number of commands written successfully.
    pub fn commands_sent(&self) -> u64 {
        self.commands_sent
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl CommandWriter<SerialStream> {
    /// Create a writer for a `SerialStream`, applying `write_timeout` where supported.
    pub fn with_timeout(mut inner: SerialStream, write_timeout: Option<Duration>) -> Result<Self> {
        match inner.set_write_timeout(write_timeout) {
            Ok(()) => {}
            Err(TransportError::Unsupported { kind, .. }) => {
                debug!(stream = inner.label(), kind, "write timeout not supported");
            }
            Err(TransportError::Io(io)) => return Err(FrameError::Io(io)),
            Err(other) => return Err(FrameError::Io(std::io::Error::other(other.to_string()))),
        }
        Ok(Self::new(inner))
    }
}
