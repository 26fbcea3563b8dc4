/// Errors that can occur while framing or decoding samples.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A frame candidate did not have the fixed frame length.
    #[error("invalid frame length ({len} bytes, expected {expected})")]
    InvalidLength { len: usize, expected: usize },

    /// The first byte of a frame candidate was not the start marker.
    #[error("invalid start marker 0x{0:02X} (expected 0xA0)")]
    InvalidStartMarker(u8),

    /// The last byte of a frame candidate was not the end marker.
    #[error("invalid end marker 0x{0:02X} (expected 0xC0)")]
    InvalidEndMarker(u8),

    /// The channel layout descriptor is inconsistent.
    #[error("invalid channel layout: {0}")]
    Layout(String),

    /// An I/O error occurred while reading frames or writing commands.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended (or stopped accepting writes) before the operation completed.
    #[error("connection closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
