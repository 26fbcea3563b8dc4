use earlink_frame::FrameError;
use earlink_transport::TransportError;

/// Numeric status reported to a host driver framework.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum StatusCode {
    Ok = 0,
    BoardNotCreated = 1,
    InvalidArguments = 2,
    StreamAlreadyRunning = 3,
    TransportError = 4,
    FrameError = 5,
    GeneralError = 6,
}

impl StatusCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

/// Errors that can occur in session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The session (or channel) has not been prepared.
    #[error("board not created; call prepare first")]
    BoardNotCreated,

    /// Command or configuration text was rejected before reaching the device.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// `start` was called while samples are already streaming.
    #[error("stream is already running")]
    StreamAlreadyRunning,

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// The wireless link collaborator reported a failure.
    #[error("link error: {0}")]
    Link(String),

    /// Session configuration could not be read.
    #[error("config error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The serial reader thread ended abnormally.
    #[error("reader thread failed: {0}")]
    Reader(String),
}

impl SessionError {
    /// Status code a host framework would see for this error.
    pub fn code(&self) -> StatusCode {
        match self {
            Self::BoardNotCreated => StatusCode::BoardNotCreated,
            Self::InvalidArguments(_) | Self::Config(_) | Self::Json(_) => {
                StatusCode::InvalidArguments
            }
            Self::StreamAlreadyRunning => StatusCode::StreamAlreadyRunning,
            Self::Transport(_) | Self::Link(_) => StatusCode::TransportError,
            Self::Frame(_) => StatusCode::FrameError,
            Self::Reader(_) => StatusCode::GeneralError,
        }
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
