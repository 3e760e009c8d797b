//! Reflected CRC-16 used to verify uploads.
//!
//! The firmware folds each byte into the low half of the accumulator and
//! shifts right, XOR-ing the polynomial whenever a set bit falls off. With
//! the default `0x8408` / `0xFFFF` parameters this is the CRC-16/MCRF4XX
//! profile (no final XOR).

/// Running checksum over the payload bytes of one transfer.
///
/// Only real chunk bytes are fed in; tags and pad bytes never are. The
/// value depends on the concatenated byte stream only, not on how it was
/// split into blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crc16 {
    polynomial: u16,
    value: u16,
}

impl Crc16 {
    /// Start a new accumulator.
    pub fn new(polynomial: u16, initial: u16) -> Self {
        Self {
            polynomial,
            value: initial,
        }
    }

    /// Fold `data` into the accumulator.
    pub fn update(&mut self, data: &[u8]) {
        for &byte in data {
            self.value ^= u16::from(byte);
            for _ in 0..8 {
                if self.value & 1 != 0 {
                    self.value = (self.value >> 1) ^ self.polynomial;
                } else {
                    self.value >>= 1;
                }
            }
        }
    }

    /// Current checksum.
    pub fn value(&self) -> u16 {
        self.value
    }
}

/// One-shot checksum of `data`.
pub fn crc16_reflected(polynomial: u16, initial: u16, data: &[u8]) -> u16 {
    let mut crc = Crc16::new(polynomial, initial);
    crc.update(data);
    crc.value()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::config::{DEFAULT_CRC_INITIAL, DEFAULT_CRC_POLYNOMIAL};

    fn crc(data: &[u8]) -> u16 {
        crc16_reflected(DEFAULT_CRC_POLYNOMIAL, DEFAULT_CRC_INITIAL, data)
    }

    #[test]
    fn test_empty_is_initial_value() {
        assert_eq!(crc(b""), 0xFFFF);
        assert_eq!(crc16_reflected(0x8408, 0x1234, b""), 0x1234);
    }

    #[test]
    fn test_check_value() {
        // CRC-16/MCRF4XX check value
        assert_eq!(crc(b"123456789"), 0x6F91);
    }

    #[test]
    fn test_single_byte() {
        // 0xFF ^ 0xFF leaves the low byte clear; eight plain shifts follow.
        assert_eq!(crc(&[0xFF]), 0x00FF);
    }

    #[test]
    fn test_chunking_does_not_matter() {
        let data: Vec<u8> = (0..=255u8).cycle().take(1500).collect();
        let whole = crc(&data);

        let mut per_byte = Crc16::new(DEFAULT_CRC_POLYNOMIAL, DEFAULT_CRC_INITIAL);
        for b in &data {
            per_byte.update(std::slice::from_ref(b));
        }
        assert_eq!(per_byte.value(), whole);

        for block in [1, 7, 60, 512, 1499] {
            let mut chunked = Crc16::new(DEFAULT_CRC_POLYNOMIAL, DEFAULT_CRC_INITIAL);
            for chunk in data.chunks(block) {
                chunked.update(chunk);
            }
            assert_eq!(chunked.value(), whole, "block size {block}");
        }
    }

    #[test]
    fn test_different_data_differs() {
        assert_ne!(crc(b"firmware-a"), crc(b"firmware-b"));
    }
}
