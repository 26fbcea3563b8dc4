//! Sample decoding and session control for earbud biosignal devices.
//!
//! earlink turns the 52-byte sample frames streamed by a left/right earbud pair into
//! scaled sample rows, over either a chunked wireless link or a serial byte stream.
//!
//! # Crate Structure
//!
//! - [`transport`]: serial byte-stream handles
//! - [`frame`]: frame validation, reassembly, decoding and status classification
//! - [`session`]: left/right channel coordination (behind `session` feature)

/// Re-export transport types.
pub mod transport {
    pub use earlink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use earlink_frame::*;
}

/// Re-export session types (requires `session` feature).
#[cfg(feature = "session")]
pub mod session {
    pub use earlink_session::*;
}
