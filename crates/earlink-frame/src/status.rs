//! Device status / version strings.
//!
//! Before streaming starts the device answers commands with ASCII status lines such as
//! `"@AAVAA-4 fw 1.2.0"`. Those payloads never reach the reassembler.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::codec::ProtocolVersion;

/// First (or second) byte of a status payload.
pub const STATUS_MARKER: u8 = b'@';

/// Version string prefix; the digits after it up to a space are the protocol version.
pub const VERSION_PREFIX: &str = "@AAVAA-";

/// Reported when a status line does not carry a recognizable version.
pub const UNKNOWN_VERSION: i32 = -1;

/// Offset checked for [`NO_VERSION_MARKER`].
const NO_VERSION_OFFSET: usize = 7;

/// Status lines with this byte at offset 7 carry no version field.
const NO_VERSION_MARKER: u8 = b'S';

/// What to do with the stored version when a status line has no parsable version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionPolicy {
    /// Store [`UNKNOWN_VERSION`]. Frames on that channel then decode with the
    /// headerless layout until a valid version line arrives.
    #[default]
    OverwriteWithSentinel,
    /// Keep the last recognized version.
    RetainOnFailure,
}

/// Return the status text carried by `payload`, if it is a status payload.
///
/// A payload is status text when its first or second byte is `@`. When only the
/// second byte is, the first byte is stripped.
pub fn classify_status(payload: &[u8]) -> Option<String> {
    status_bytes(payload).map(|raw| String::from_utf8_lossy(raw).into_owned())
}

fn status_bytes(payload: &[u8]) -> Option<&[u8]> {
    if payload.first() == Some(&STATUS_MARKER) {
        Some(payload)
    } else if payload.get(1) == Some(&STATUS_MARKER) {
        Some(&payload[1..])
    } else {
        None
    }
}

/// Extract the protocol version from a `@AAVAA-<digits> ` pattern anywhere in `text`.
///
/// Returns [`UNKNOWN_VERSION`] when no occurrence matches or the digits overflow.
pub fn extract_version(text: &str) -> i32 {
    for (start, _) in text.match_indices(VERSION_PREFIX) {
        let rest = &text[start + VERSION_PREFIX.len()..];
        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 || rest.as_bytes().get(digits) != Some(&b' ') {
            continue;
        }
        return rest[..digits].parse().unwrap_or(UNKNOWN_VERSION);
    }
    UNKNOWN_VERSION
}

/// Most recent status text and protocol version for one channel.
///
/// [`DeviceStatus::apply`] is the only way the notification path changes it.
#[derive(Debug, Clone)]
pub struct DeviceStatus {
    text: Option<String>,
    version: i32,
    received_at: Option<Instant>,
    policy: VersionPolicy,
}

impl DeviceStatus {
    pub fn new(policy: VersionPolicy) -> Self {
        Self {
            text: None,
            version: ProtocolVersion::DEFAULT_REPORTED,
            received_at: None,
            policy,
        }
    }

    /// Classify a pre-streaming payload and record it if it is status text.
    ///
    /// Returns `false` (and changes nothing) for anything else.
    pub fn apply(&mut self, payload: &[u8]) -> bool {
        let Some(raw) = status_bytes(payload) else {
            trace!(len = payload.len(), "discarding non-status payload");
            return false;
        };
        let text = String::from_utf8_lossy(raw).into_owned();

        // Offset 7 is a byte position in the payload, not in the decoded text.
        if raw.get(NO_VERSION_OFFSET) != Some(&NO_VERSION_MARKER) {
            let extracted = extract_version(&text);
            if extracted == UNKNOWN_VERSION && self.policy == VersionPolicy::RetainOnFailure {
                debug!(status = %text, version = self.version, "keeping previous version");
            } else {
                self.version = extracted;
            }
        }

        trace!(status = %text, version = self.version, "received status string");
        self.text = Some(text);
        self.received_at = Some(Instant::now());
        true
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Return the stored status text and clear it.
    pub fn take_text(&mut self) -> Option<String> {
        self.text.take()
    }

    /// Raw version number, possibly [`UNKNOWN_VERSION`].
    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn protocol_version(&self) -> ProtocolVersion {
        ProtocolVersion::from_reported(self.version)
    }

    /// When the last status payload arrived.
    pub fn received_at(&self) -> Option<Instant> {
        self.received_at
    }

    pub fn policy(&self) -> VersionPolicy {
        self.policy
    }
}

impl Default for DeviceStatus {
    fn default() -> Self {
        Self::new(VersionPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_leading_marker() {
        assert_eq!(
            classify_status(b"@AAVAA-4 ok").as_deref(),
            Some("@AAVAA-4 ok")
        );
    }

    #[test]
    fn strips_byte_before_second_position_marker() {
        assert_eq!(
            classify_status(b"\x05@AAVAA-3 ok").as_deref(),
            Some("@AAVAA-3 ok")
        );
    }

    #[test]
    fn rejects_sample_data() {
        assert!(classify_status(&[0xA0, 0x01, 0x02]).is_none());
        assert!(classify_status(&[]).is_none());
        assert!(classify_status(&[0x01]).is_none());
    }

    #[test]
    fn extracts_version_digits() {
        assert_eq!(extract_version("@AAVAA-4 fw"), 4);
        assert_eq!(extract_version("xx @AAVAA-12 "), 12);
        assert_eq!(extract_version("@AAVAA-x @AAVAA-3 "), 3);
        assert_eq!(extract_version("@AAVAA-4"), UNKNOWN_VERSION);
        assert_eq!(extract_version("@AAVAA- 4 "), UNKNOWN_VERSION);
        assert_eq!(extract_version("@AAVAA-99999999999 "), UNKNOWN_VERSION);
    }

    #[test]
    fn status_payload_updates_version() {
        let mut status = DeviceStatus::default();
        assert_eq!(status.version(), 3);

        assert!(status.apply(b"@AAVAA-4 ready"));
        assert_eq!(status.version(), 4);
        assert_eq!(status.protocol_version(), ProtocolVersion::V4);
        assert_eq!(status.text(), Some("@AAVAA-4 ready"));
        assert!(status.received_at().is_some());
    }

    #[test]
    fn non_status_payload_is_discarded() {
        let mut status = DeviceStatus::default();
        assert!(!status.apply(&[0xA0, 0x00, 0x11]));
        assert_eq!(status.text(), None);
        assert_eq!(status.version(), 3);
    }

    #[test]
    fn marker_at_offset_seven_skips_version_extraction() {
        let mut status = DeviceStatus::default();
        status.apply(b"@AAVAA-4 ");
        assert!(status.apply(b"@AAVAA-Status ok"));
        assert_eq!(status.version(), 4);
        assert_eq!(status.text(), Some("@AAVAA-Status ok"));
    }

    #[test]
    fn version_marker_offset_counts_raw_bytes() {
        let mut status = DeviceStatus::default();
        status.apply(b"@AAVAA-4 ");

        // 0xFF decodes to a three-byte replacement character, which would move the
        // `S` off offset 7 if the check ran on the decoded text.
        assert!(status.apply(b"@\xffAVAA-Status"));
        assert_eq!(status.version(), 4);
        assert!(status.text().is_some_and(|text| text.contains('\u{FFFD}')));
    }

    #[test]
    fn unmatched_version_overwrites_with_sentinel_by_default() {
        let mut status = DeviceStatus::default();
        status.apply(b"@AAVAA-4 ");
        status.apply(b"@battery 80");

        assert_eq!(status.version(), UNKNOWN_VERSION);
        assert_eq!(status.protocol_version(), ProtocolVersion::V4);
    }

    #[test]
    fn retain_policy_keeps_last_good_version() {
        let mut status = DeviceStatus::new(VersionPolicy::RetainOnFailure);
        status.apply(b"@AAVAA-3 ");
        status.apply(b"@battery 80");

        assert_eq!(status.version(), 3);
        assert_eq!(status.text(), Some("@battery 80"));
    }

    #[test]
    fn policy_names_are_snake_case() {
        let json = serde_json::to_string(&VersionPolicy::RetainOnFailure).unwrap();
        assert_eq!(json, "\"retain_on_failure\"");
        let parsed: VersionPolicy = serde_json::from_str("\"overwrite_with_sentinel\"").unwrap();
        assert_eq!(parsed, VersionPolicy::OverwriteWithSentinel);
    }

    #[test]
    fn take_text_clears() {
        let mut status = DeviceStatus::default();
        status.apply(b"@AAVAA-4 ");
        assert_eq!(status.take_text().as_deref(), Some("@AAVAA-4 "));
        assert_eq!(status.take_text(), None);
        assert_eq!(status.version(), 4);
    }
}
