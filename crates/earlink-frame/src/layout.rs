//! Channel layout descriptor.
//!
//! Maps decoded frame fields onto slots of the host's sample row. The host framework
//! owns this descriptor; the decoder only reads it.

use serde::{Deserialize, Serialize};

use crate::codec::{AMPLITUDE_CHANNELS, ORIENTATION_CHANNELS};
use crate::error::{FrameError, Result};

/// Row indices for every field the decoder fills in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelLayout {
    /// Length of one sample row.
    pub num_rows: usize,
    /// Slot receiving the frame's package number.
    pub package_num_channel: usize,
    /// Slots receiving the amplitude channels, in frame order.
    pub eeg_channels: Vec<usize>,
    /// Slots receiving the three orientation channels.
    pub rotation_channels: [usize; ORIENTATION_CHANNELS],
    /// Slot receiving the battery level.
    pub battery_channel: usize,
    /// Gesture code, detection 1, detection 2, device status byte, device timestamp.
    pub other_channels: [usize; 5],
    /// Slot receiving the local receive time.
    pub timestamp_channel: usize,
}

impl Default for ChannelLayout {
    fn default() -> Self {
        Self {
            num_rows: 19,
            package_num_channel: 0,
            eeg_channels: (1..=AMPLITUDE_CHANNELS).collect(),
            rotation_channels: [9, 10, 11],
            battery_channel: 12,
            other_channels: [13, 14, 15, 16, 17],
            timestamp_channel: 18,
        }
    }
}

impl ChannelLayout {
    pub fn gesture_channel(&self) -> usize {
        self.other_channels[0]
    }

    pub fn detection_channels(&self) -> [usize; 2] {
        [self.other_channels[1], self.other_channels[2]]
    }

    pub fn device_status_channel(&self) -> usize {
        self.other_channels[3]
    }

    pub fn device_timestamp_channel(&self) -> usize {
        self.other_channels[4]
    }

    /// Check that every slot fits in the row and the frame carries enough amplitude data.
    pub fn validate(&self) -> Result<()> {
        if self.num_rows == 0 {
            return Err(FrameError::Layout("num_rows must be at least 1".to_string()));
        }
        if self.eeg_channels.len() > AMPLITUDE_CHANNELS {
            return Err(FrameError::Layout(format!(
                "{} amplitude channels requested, frame carries {}",
                self.eeg_channels.len(),
                AMPLITUDE_CHANNELS
            )));
        }

        let named = [
            ("package_num_channel", self.package_num_channel),
            ("battery_channel", self.battery_channel),
            ("timestamp_channel", self.timestamp_channel),
        ];
        let listed = self
            .eeg_channels
            .iter()
            .map(|idx| ("eeg_channels", *idx))
            .chain(self.rotation_channels.iter().map(|idx| ("rotation_channels", *idx)))
            .chain(self.other_channels.iter().map(|idx| ("other_channels", *idx)));

        for (name, idx) in named.into_iter().chain(listed) {
            if idx >= self.num_rows {
                return Err(FrameError::Layout(format!(
                    "{name} index {idx} out of range (num_rows {})",
                    self.num_rows
                )));
            }
        }
        Ok(())
    }
}
