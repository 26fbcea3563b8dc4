use std::fmt;

use crate::error::{FrameError, Result};

/// Total size of one sample frame on the wire.
pub const FRAME_LEN: usize = 52;

/// First byte of every frame.
pub const START_MARKER: u8 = 0xA0;

/// Last byte of every frame.
pub const END_MARKER: u8 = 0xC0;

/// Number of amplitude (EEG) channels carried per frame.
pub const AMPLITUDE_CHANNELS: usize = 8;

/// Number of orientation channels carried per frame.
pub const ORIENTATION_CHANNELS: usize = 3;

/// Byte offsets of the fixed frame layout.
pub mod offsets {
    pub const PACKAGE_NUM: usize = 1;
    pub const AMPLITUDE: usize = 2;
    pub const ORIENTATION: usize = 34;
    pub const BATTERY: usize = 40;
    pub const DEVICE_STATUS: usize = 41;
    pub const DEVICE_TIMESTAMP: usize = 42;
    pub const GESTURE: usize = 46;
    pub const DETECTION: [usize; 2] = [47, 49];
}

/// One validated sample frame.
///
/// Only constructible through [`Frame::from_bytes`], so a `Frame` always starts with
/// [`START_MARKER`] and ends with [`END_MARKER`].
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    bytes: [u8; FRAME_LEN],
}

impl Frame {
    /// Validate a candidate and take ownership of its bytes.
    pub fn from_bytes(candidate: &[u8]) -> Result<Self> {
        let bytes: [u8; FRAME_LEN] =
            candidate.try_into().map_err(|_| FrameError::InvalidLength {
                len: candidate.len(),
                expected: FRAME_LEN,
            })?;

        if bytes[0] != START_MARKER {
            return Err(FrameError::InvalidStartMarker(bytes[0]));
        }
        if bytes[FRAME_LEN - 1] != END_MARKER {
            return Err(FrameError::InvalidEndMarker(bytes[FRAME_LEN - 1]));
        }

        Ok(Self { bytes })
    }

    /// Raw frame bytes, markers included.
    pub fn as_bytes(&self) -> &[u8; FRAME_LEN] {
        &self.bytes
    }

    /// Sample sequence number assigned by the device (wraps at 255).
    pub fn package_number(&self) -> u8 {
        self.bytes[offsets::PACKAGE_NUM]
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("package_number", &self.package_number())
            .field("len", &FRAME_LEN)
            .finish()
    }
}

/// Firmware protocol revision.
///
/// The two revisions share the frame layout but differ in how the wireless transport
/// prefixes notifications and in the device timestamp resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolVersion {
    /// Notifications carry a 3-byte transport header; timestamp ticks are 4 ms.
    #[default]
    V3,
    /// No notification header; timestamp ticks are 1 ms.
    V4,
}

impl ProtocolVersion {
    /// Version assumed before the device has reported one.
    pub const DEFAULT_REPORTED: i32 = 3;

    /// Map a version number reported by the device to a protocol variant.
    ///
    /// Anything other than 3 (including the `-1` "not recognized" value) uses the
    /// headerless layout.
    pub fn from_reported(reported: i32) -> Self {
        if reported == 3 {
            Self::V3
        } else {
            Self::V4
        }
    }

    /// Bytes to drop from the head of every wireless notification.
    pub fn header_trim(self) -> usize {
        match self {
            Self::V3 => 3,
            Self::V4 => 0,
        }
    }

    /// Multiplier converting device timestamp ticks to seconds.
    pub fn timestamp_scale(self) -> f64 {
        match self {
            Self::V3 => 4.0 / 1000.0,
            Self::V4 => 1.0 / 1000.0,
        }
    }
}

/// Field values for building a frame, e.g. to emulate a device in tests or loopback rigs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameFields {
    pub package_number: u8,
    pub amplitudes: [f32; AMPLITUDE_CHANNELS],
    pub orientation: [i16; ORIENTATION_CHANNELS],
    pub battery: u8,
    pub device_status: u8,
    pub device_timestamp: u32,
    pub gesture: u8,
    pub detection: [i16; 2],
}

/// Encode field values into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────┬─────┬────────────┬───────────┬─────┬──────┬──────────┬─────┬───────────┬──────┐
/// │ 0xA0 │ pkg │ 8 × f32 LE │ 3 × i16 LE│ bat │ stat │ u32 LE ts│ gest│ 2 × i16 LE│ 0xC0 │
/// │  0   │  1  │   2..34    │  34..40   │ 40  │  41  │  42..46  │ 46  │  47..51   │  51  │
/// └──────┴─────┴────────────┴───────────┴─────┴──────┴──────────┴─────┴───────────┴──────┘
/// ```
pub fn encode_frame(fields: &FrameFields) -> [u8; FRAME_LEN] {
    let mut out = [0u8; FRAME_LEN];
    out[0] = START_MARKER;
    out[offsets::PACKAGE_NUM] = fields.package_number;

    for (i, value) in fields.amplitudes.iter().enumerate() {
        let at = offsets::AMPLITUDE + 4 * i;
        out[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }
    for (i, value) in fields.orientation.iter().enumerate() {
        let at = offsets::ORIENTATION + 2 * i;
        out[at..at + 2].copy_from_slice(&value.to_le_bytes());
    }

    out[offsets::BATTERY] = fields.battery;
    out[offsets::DEVICE_STATUS] = fields.device_status;
    out[offsets::DEVICE_TIMESTAMP..offsets::DEVICE_TIMESTAMP + 4]
        .copy_from_slice(&fields.device_timestamp.to_le_bytes());
    out[offsets::GESTURE] = fields.gesture;
    for (at, value) in offsets::DETECTION.iter().zip(fields.detection) {
        out[*at..*at + 2].copy_from_slice(&value.to_le_bytes());
    }

    out[FRAME_LEN - 1] = END_MARKER;
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_frame_validates() {
        let wire = encode_frame(&FrameFields {
            package_number: 42,
            ..FrameFields::default()
        });

        let frame = Frame::from_bytes(&wire).unwrap();
        assert_eq!(frame.package_number(), 42);
        assert_eq!(frame.as_bytes(), &wire);
    }

    #[test]
    fn rejects_short_candidate() {
        let wire = encode_frame(&FrameFields::default());
        let err = Frame::from_bytes(&wire[..FRAME_LEN - 1]).unwrap_err();
        assert!(matches!(
            err,
            FrameError::InvalidLength {
                len: 51,
                expected: FRAME_LEN
            }
        ));
    }

    #[test]
    fn rejects_bad_markers() {
        let mut wire = encode_frame(&FrameFields::default());
        wire[0] = 0x00;
        assert!(matches!(
            Frame::from_bytes(&wire),
            Err(FrameError::InvalidStartMarker(0x00))
        ));

        let mut wire = encode_frame(&FrameFields::default());
        wire[FRAME_LEN - 1] = 0xC1;
        assert!(matches!(
            Frame::from_bytes(&wire),
            Err(FrameError::InvalidEndMarker(0xC1))
        ));
    }

    #[test]
    fn version_mapping() {
        assert_eq!(ProtocolVersion::from_reported(3), ProtocolVersion::V3);
        assert_eq!(ProtocolVersion::from_reported(4), ProtocolVersion::V4);
        assert_eq!(ProtocolVersion::from_reported(-1), ProtocolVersion::V4);
        assert_eq!(
            ProtocolVersion::from_reported(ProtocolVersion::DEFAULT_REPORTED),
            ProtocolVersion::default()
        );

        assert_eq!(ProtocolVersion::V3.header_trim(), 3);
        assert_eq!(ProtocolVersion::V4.header_trim(), 0);
        assert!((ProtocolVersion::V3.timestamp_scale() - 0.004).abs() < f64::EPSILON);
        assert!((ProtocolVersion::V4.timestamp_scale() - 0.001).abs() < f64::EPSILON);
    }

    #[test]
    fn field_offsets_match_layout() {
        let wire = encode_frame(&FrameFields {
            battery: 77,
            device_status: 5,
            device_timestamp: 0x0403_0201,
            gesture: 9,
            detection: [-2, 300],
            ..FrameFields::default()
        });

        assert_eq!(wire[40], 77);
        assert_eq!(wire[41], 5);
        assert_eq!(&wire[42..46], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(wire[46], 9);
        assert_eq!(i16::from_le_bytes([wire[47], wire[48]]), -2);
        assert_eq!(i16::from_le_bytes([wire[49], wire[50]]), 300);
    }
}
