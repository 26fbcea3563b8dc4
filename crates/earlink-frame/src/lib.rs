//! Fixed-length sample framing for earbud biosignal devices.
//!
//! Every sample travels as one 52-byte frame:
//! - A start marker `0xA0` and an end marker `0xC0` for stream synchronization
//! - Eight little-endian `f32` amplitudes, three `i16` orientation values
//! - Battery, status, a `u32` device timestamp, gesture and two detection values
//!
//! Two ingestion paths share the frame rules: [`FrameReassembler`] for chunked
//! wireless notifications and [`SerialFrameReader`] for a blocking byte stream.
//! Both hand validated frames to a [`FrameDecoder`], which writes one [`Sample`]
//! row per frame according to a [`ChannelLayout`].

#[cfg(feature = "async")]
pub mod async_codec;
pub mod codec;
pub mod decode;
pub mod error;
pub mod layout;
pub mod reader;
pub mod reassembler;
pub mod sample;
pub mod status;
pub mod writer;

#[cfg(feature = "async")]
pub use async_codec::FrameCodec;
pub use codec::{
    encode_frame, Frame, FrameFields, ProtocolVersion, END_MARKER, FRAME_LEN, START_MARKER,
};
pub use decode::{Clock, DecodeProfile, FrameDecoder, SystemClock, EEG_SCALE, IMU_SCALE};
pub use error::{FrameError, Result};
pub use layout::ChannelLayout;
pub use reader::{SerialFrameReader, SerialReaderConfig};
pub use reassembler::{FrameReassembler, Frames, ReassemblerStats};
pub use sample::{Sample, SampleSink};
pub use status::{classify_status, extract_version, DeviceStatus, VersionPolicy, UNKNOWN_VERSION};
pub use writer::CommandWriter;
