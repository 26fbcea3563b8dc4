//! Left/right channel session management for earbud biosignal devices.
//!
//! A session is two independent [`Channel`]s driven in lockstep by a
//! [`ChannelCoordinator`]. Two channel kinds are provided:
//! - [`WirelessChannel`]: push model, the link calls a [`NotificationHandler`] per chunk
//! - [`SerialBoard`]: pull model, a background thread reads a serial byte stream

pub mod channel;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod serial_board;
pub mod wireless;

pub use channel::{Channel, Side, StatusReport};
pub use config::{SessionConfig, DEFAULT_START_COMMAND, DEFAULT_STOP_COMMAND};
pub use coordinator::{ChannelCoordinator, SessionState};
pub use error::{Result, SessionError, StatusCode};
pub use serial_board::{GainDecision, GainTracker, PassthroughGain, SerialBoard, StreamOpener};
pub use wireless::{NotificationHandler, WirelessChannel, WirelessLink};
