//! Protocol constants, pinned to the device firmware contract.

use std::time::Duration;

use crate::error::{Error, Result};

/// Immutable protocol parameters captured once by the client.
///
/// The defaults match the Daisy Seed CLI firmware: 64-byte receive buffer
/// split into a 4-byte tag and 60 payload bytes, `'0'` padding, and a
/// reflected CRC-16 with polynomial `0x8408` seeded with `0xFFFF`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ProtocolConfig {
    /// Payload bytes per frame (BLOCKSIZE).
    pub block_size: usize,
    /// Tag prefixed to every data frame.
    pub data_tag: String,
    /// Tag prefixed to the terminator frame.
    pub stop_tag: String,
    /// Filler byte appended to short chunks.
    pub pad_byte: u8,
    /// Marker starting every device response line.
    pub response_prefix: String,
    /// Prefix distinguishing flags from positional arguments.
    pub flag_prefix: String,
    /// Status tokens meaning OK.
    pub ok_tokens: Vec<String>,
    /// Status tokens meaning ERROR.
    pub error_tokens: Vec<String>,
    /// Status tokens meaning FINISHED.
    pub finished_tokens: Vec<String>,
    /// Reflected CRC-16 polynomial.
    pub crc_polynomial: u16,
    /// CRC accumulator initial value.
    pub crc_initial: u16,
    /// Wait between writing a request and reading the response.
    #[cfg_attr(feature = "serde", serde(with = "millis"))]
    pub settle_delay: Duration,
    /// Upper bound on one response line in bytes.
    pub max_line_len: usize,
}

/// Payload bytes per frame expected by the firmware.
pub const DEFAULT_BLOCK_SIZE: usize = 60;

/// Default CRC polynomial (reflected 0x1021).
pub const DEFAULT_CRC_POLYNOMIAL: u16 = 0x8408;

/// Default CRC initial value.
pub const DEFAULT_CRC_INITIAL: u16 = 0xFFFF;

/// Default settle delay after each write.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(20);

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            data_tag: "data".into(),
            stop_tag: "stop".into(),
            pad_byte: b'0',
            response_prefix: "[SEED]:".into(),
            flag_prefix: "--".into(),
            ok_tokens: vec!["OK".into()],
            error_tokens: vec!["ERR".into(), "ERROR".into()],
            finished_tokens: vec!["FNSH".into(), "FINISHED".into()],
            crc_polynomial: DEFAULT_CRC_POLYNOMIAL,
            crc_initial: DEFAULT_CRC_INITIAL,
            settle_delay: DEFAULT_SETTLE_DELAY,
            max_line_len: 256,
        }
    }
}

impl ProtocolConfig {
    /// Set the payload bytes per frame.
    #[must_use]
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Set the settle delay.
    #[must_use]
    pub fn with_settle_delay(mut self, settle_delay: Duration) -> Self {
        self.settle_delay = settle_delay;
        self
    }

    /// Set the CRC parameters.
    #[must_use]
    pub fn with_crc(mut self, polynomial: u16, initial: u16) -> Self {
        self.crc_polynomial = polynomial;
        self.crc_initial = initial;
        self
    }

    /// Length of the tag carried by every frame.
    pub fn tag_len(&self) -> usize {
        self.data_tag.len()
    }

    /// Total length of every frame sent during an upload.
    pub fn frame_len(&self) -> usize {
        self.tag_len() + self.block_size
    }

    /// Check that frames can be built and responses classified.
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(Error::Config("block size must be at least 1".into()));
        }
        if self.data_tag.is_empty() || self.stop_tag.is_empty() {
            return Err(Error::Config("frame tags must not be empty".into()));
        }
        if self.data_tag.len() != self.stop_tag.len() {
            return Err(Error::Config(format!(
                "data tag '{}' and stop tag '{}' must have the same length",
                self.data_tag, self.stop_tag
            )));
        }
        if self.data_tag == self.stop_tag {
            return Err(Error::Config("data and stop tags must differ".into()));
        }
        if self.flag_prefix.is_empty() {
            return Err(Error::Config("flag prefix must not be empty".into()));
        }
        for (name, tokens) in [
            ("ok", &self.ok_tokens),
            ("error", &self.error_tokens),
            ("finished", &self.finished_tokens),
        ] {
            if tokens.is_empty() || tokens.iter().any(String::is_empty) {
                return Err(Error::Config(format!("{name} status tokens must not be empty")));
            }
        }
        if self.max_line_len == 0 {
            return Err(Error::Config("max line length must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(feature = "serde")]
mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_firmware() {
        let config = ProtocolConfig::default();
        assert_eq!(config.block_size, 60);
        assert_eq!(config.frame_len(), 64);
        assert_eq!(config.pad_byte, b'0');
        assert_eq!(config.crc_polynomial, 0x8408);
        assert_eq!(config.crc_initial, 0xFFFF);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builders() {
        let config = ProtocolConfig::default()
            .with_block_size(512)
            .with_settle_delay(Duration::ZERO)
            .with_crc(0xA001, 0x0000);
        assert_eq!(config.frame_len(), 516);
        assert_eq!(config.settle_delay, Duration::ZERO);
        assert_eq!(config.crc_polynomial, 0xA001);
        assert_eq!(config.crc_initial, 0);
    }

    #[test]
    fn test_validate_rejects_zero_block_size() {
        let config = ProtocolConfig::default().with_block_size(0);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_unequal_tags() {
        let config = ProtocolConfig {
            stop_tag: "end".into(),
            ..ProtocolConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_identical_tags() {
        let config = ProtocolConfig {
            stop_tag: "data".into(),
            ..ProtocolConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_tokens() {
        let config = ProtocolConfig {
            finished_tokens: Vec::new(),
            ..ProtocolConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
