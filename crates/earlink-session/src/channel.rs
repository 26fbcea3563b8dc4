use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use earlink_frame::DeviceStatus;

use crate::error::Result;

/// Which half of the earbud pair a channel talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status text taken from a channel, with the version it carried and when it arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub side: Side,
    pub text: String,
    pub version: i32,
    pub received_at: Instant,
}

/// One physical transport channel, driven by the coordinator.
///
/// Implementations are expected to be independent: nothing in one channel's state is
/// shared with the other side.
pub trait Channel: Send {
    fn side(&self) -> Side;

    /// Acquire the transport.
    fn prepare(&mut self) -> Result<()>;

    /// Ask the device to stream samples.
    fn start(&mut self) -> Result<()>;

    /// Ask the device to stop streaming. Must be safe to call when not streaming.
    fn stop(&mut self) -> Result<()>;

    /// Give the transport back. Must be safe to call after a failed `prepare`.
    fn release(&mut self) -> Result<()>;

    /// Write a raw command to the device.
    fn send_command(&mut self, command: &str) -> Result<()>;

    /// Apply a configuration command. Defaults to a plain command write.
    fn config_board(&mut self, config: &str) -> Result<()> {
        self.send_command(config)
    }

    /// Take the most recent status text, clearing it.
    fn take_status(&mut self) -> Option<StatusReport>;

    fn is_streaming(&self) -> bool;
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn take_report(side: Side, status: &Mutex<DeviceStatus>) -> Option<StatusReport> {
    let mut status = lock(status);
    let received_at = status.received_at()?;
    let version = status.version();
    let text = status.take_text()?;
    Some(StatusReport {
        side,
        text,
        version,
        received_at,
    })
}
