use std::path::Path;
use std::time::Duration;

use earlink_frame::{ChannelLayout, VersionPolicy};
use earlink_transport::{SerialSettings, DEFAULT_BAUD_RATE};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SessionError};

/// Command that starts sample streaming.
pub const DEFAULT_START_COMMAND: &str = "b";

/// Command that stops sample streaming.
pub const DEFAULT_STOP_COMMAND: &str = "9";

/// Leading characters of commands the device answers with a status line.
pub const DEFAULT_WRITE_PREFIXES: [char; 2] = ['w', '~'];

/// Session-wide settings shared by both channels.
///
/// Every field has a default, so a JSON file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long `config_board` waits for a status response, in milliseconds.
    pub status_response_delay_ms: u64,
    /// Commands starting with one of these characters produce a status response.
    pub write_prefixes: Vec<char>,
    pub start_command: String,
    pub stop_command: String,
    /// Handling of status lines without a recognizable version.
    pub version_policy: VersionPolicy,
    /// Line speed for serial devices.
    pub serial_baud_rate: u32,
    /// Read timeout for serial streams, in milliseconds. Bounds how long `stop` waits
    /// for the reader thread when the device is quiet.
    pub serial_read_timeout_ms: Option<u64>,
    /// Write timeout for serial commands, in milliseconds.
    pub serial_write_timeout_ms: Option<u64>,
    /// Slot assignment for decoded samples.
    pub layout: ChannelLayout,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            status_response_delay_ms: 250,
            write_prefixes: DEFAULT_WRITE_PREFIXES.to_vec(),
            start_command: DEFAULT_START_COMMAND.to_string(),
            stop_command: DEFAULT_STOP_COMMAND.to_string(),
            version_policy: VersionPolicy::default(),
            serial_baud_rate: DEFAULT_BAUD_RATE,
            serial_read_timeout_ms: Some(100),
            serial_write_timeout_ms: Some(1000),
            layout: ChannelLayout::default(),
        }
    }
}

impl SessionConfig {
    /// Parse a JSON document and validate the layout it carries.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.layout.validate()?;
        Ok(config)
    }

    /// Load from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|err| SessionError::Config(format!("{}: {err}", path.display())))?;
        Self::from_json_str(&text)
    }

    pub fn status_response_delay(&self) -> Duration {
        Duration::from_millis(self.status_response_delay_ms)
    }

    pub fn serial_read_timeout(&self) -> Option<Duration> {
        self.serial_read_timeout_ms.map(Duration::from_millis)
    }

    pub fn serial_write_timeout(&self) -> Option<Duration> {
        self.serial_write_timeout_ms.map(Duration::from_millis)
    }

    /// Settings used to open a serial device. The port starts out with the read timeout.
    pub fn serial_settings(&self) -> SerialSettings {
        let defaults = SerialSettings::default();
        SerialSettings {
            baud_rate: self.serial_baud_rate,
            timeout: self.serial_read_timeout().unwrap_or(defaults.timeout),
        }
    }

    /// Whether `command` is one the device answers with a status line.
    pub fn expects_status_response(&self, command: &str) -> bool {
        command
            .chars()
            .next()
            .is_some_and(|first| self.write_prefixes.contains(&first))
    }

    pub fn with_status_response_delay(mut self, delay: Duration) -> Self {
        self.status_response_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_version_policy(mut self, policy: VersionPolicy) -> Self {
        self.version_policy = policy;
        self
    }

    pub fn with_layout(mut self, layout: ChannelLayout) -> Self {
        self.layout = layout;
        self
    }
}
