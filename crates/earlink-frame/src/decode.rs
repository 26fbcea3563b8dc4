//! Frame → sample conversion.
//!
//! Every field is decoded independently. A field that cannot be decoded is left at
//! zero and logged; the rest of the sample is still delivered.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::warn;

use crate::codec::{offsets, Frame, ProtocolVersion};
use crate::error::Result;
use crate::layout::ChannelLayout;
use crate::sample::Sample;

/// ADC reference voltage in volts.
pub const ADC_REFERENCE_VOLTAGE: f64 = 4.5;

/// ADC gain the firmware is assumed to run with.
pub const ADC_ASSUMED_GAIN: f64 = 12.0;

/// ADC counts → microvolts.
pub const EEG_SCALE: f64 =
    ADC_REFERENCE_VOLTAGE / ((1u32 << 23) - 1) as f64 / ADC_ASSUMED_GAIN * 1_000_000.0;

/// Orientation counts → degrees.
pub const IMU_SCALE: f64 = 1.0 / 100.0;

/// Detection channel multiplier on the wireless transport.
pub const WIRELESS_DETECTION_SCALE: f64 = 1.0;

/// Source of the local receive timestamp.
pub trait Clock: Send + Sync {
    /// Seconds since the Unix epoch.
    fn now(&self) -> f64;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl<F> Clock for F
where
    F: Fn() -> f64 + Send + Sync,
{
    fn now(&self) -> f64 {
        self()
    }
}

/// Per-transport scaling constants.
///
/// The wireless and serial firmwares agree on the layout but not on units: the serial
/// firmware reports detection values and device ticks raw. `None` stores the raw value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodeProfile {
    pub eeg_scale: f64,
    pub imu_scale: f64,
    pub detection_scale: Option<f64>,
    pub timestamp_scale: Option<f64>,
}

impl DecodeProfile {
    /// Constants for the wireless notification transport.
    pub fn wireless(version: ProtocolVersion) -> Self {
        Self {
            eeg_scale: EEG_SCALE,
            imu_scale: IMU_SCALE,
            detection_scale: Some(WIRELESS_DETECTION_SCALE),
            timestamp_scale: Some(version.timestamp_scale()),
        }
    }

    /// Constants for the serial byte-stream transport.
    pub fn serial() -> Self {
        Self {
            eeg_scale: EEG_SCALE,
            imu_scale: IMU_SCALE,
            detection_scale: None,
            timestamp_scale: None,
        }
    }
}

/// Converts validated frames into sample rows.
#[derive(Clone)]
pub struct FrameDecoder {
    layout: ChannelLayout,
    profile: DecodeProfile,
    clock: Arc<dyn Clock>,
}

impl FrameDecoder {
    /// Create a decoder using the system clock for receive timestamps.
    pub fn new(layout: ChannelLayout, profile: DecodeProfile) -> Result<Self> {
        layout.validate()?;
        Ok(Self {
            layout,
            profile,
            clock: Arc::new(SystemClock),
        })
    }

    /// Replace the receive-timestamp source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn layout(&self) -> &ChannelLayout {
        &self.layout
    }

    pub fn profile(&self) -> DecodeProfile {
        self.profile
    }

    /// Switch scaling constants, e.g. after the device reports its protocol version.
    pub fn set_profile(&mut self, profile: DecodeProfile) {
        self.profile = profile;
    }

    /// Decode one frame. Never fails; undecodable fields stay at zero.
    pub fn decode(&self, frame: &Frame) -> Sample {
        let bytes = frame.as_bytes();
        let layout = &self.layout;
        let mut sample = Sample::zeroed(layout.num_rows);

        sample.set(
            layout.package_num_channel,
            f64::from(bytes[offsets::PACKAGE_NUM]),
        );

        for (i, slot) in layout.eeg_channels.iter().enumerate() {
            match read_f32_le(bytes, offsets::AMPLITUDE + 4 * i) {
                Some(value) if value.is_finite() => {
                    sample.set(*slot, self.profile.eeg_scale * f64::from(value));
                }
                other => warn!(channel = i, value = ?other, "amplitude not decodable"),
            }
        }

        for (i, slot) in layout.rotation_channels.iter().enumerate() {
            match read_i16_le(bytes, offsets::ORIENTATION + 2 * i) {
                Some(value) => sample.set(*slot, self.profile.imu_scale * f64::from(value)),
                None => warn!(channel = i, "orientation not decodable"),
            }
        }

        sample.set(layout.battery_channel, f64::from(bytes[offsets::BATTERY]));

        sample.set(layout.gesture_channel(), f64::from(bytes[offsets::GESTURE]));
        for (at, slot) in offsets::DETECTION.iter().zip(layout.detection_channels()) {
            match read_i16_le(bytes, *at) {
                Some(value) => {
                    sample.set(slot, scaled(f64::from(value), self.profile.detection_scale));
                }
                None => warn!(offset = *at, "detection value not decodable"),
            }
        }

        sample.set(
            layout.device_status_channel(),
            f64::from(bytes[offsets::DEVICE_STATUS]),
        );

        match read_u32_le(bytes, offsets::DEVICE_TIMESTAMP) {
            Some(ticks) => sample.set(
                layout.device_timestamp_channel(),
                scaled(f64::from(ticks), self.profile.timestamp_scale),
            ),
            None => warn!("device timestamp not decodable, leaving zero"),
        }

        sample.set(layout.timestamp_channel, self.clock.now());
        sample
    }
}

impl std::fmt::Debug for FrameDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameDecoder")
            .field("layout", &self.layout)
            .field("profile", &self.profile)
            .finish_non_exhaustive()
    }
}

fn scaled(raw: f64, scale: Option<f64>) -> f64 {
    match scale {
        Some(scale) => raw * scale,
        None => raw,
    }
}

fn read_f32_le(bytes: &[u8], at: usize) -> Option<f32> {
    let raw: [u8; 4] = bytes.get(at..at + 4)?.try_into().ok()?;
    Some(f32::from_le_bytes(raw))
}

fn read_i16_le(bytes: &[u8], at: usize) -> Option<i16> {
    let raw: [u8; 2] = bytes.get(at..at + 2)?.try_into().ok()?;
    Some(i16::from_le_bytes(raw))
}

fn read_u32_le(bytes: &[u8], at: usize) -> Option<u32> {
    let raw: [u8; 4] = bytes.get(at..at + 4)?.try_into().ok()?;
    Some(u32::from_le_bytes(raw))
}
