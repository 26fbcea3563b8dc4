//! Byte-stream transport handles for earbud biosignal devices.
//!
//! Provides the blocking, pull-model byte stream the serial frame reader runs on:
//! - Serial devices opened through `serialport` with a baud rate and read timeout
//! - Raw capture files for replay
//! - Connected Unix socket pairs (loopback rigs and tests)
//!
//! Establishing the physical link (pairing, port discovery) happens outside this crate.
//! Everything here starts from an already-present device path or socket.

pub mod error;
pub mod stream;

pub use error::{Result, TransportError};
pub use stream::{SerialSettings, SerialStream, DEFAULT_BAUD_RATE};
