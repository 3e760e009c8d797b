//! Fixed-length frames for the upload phase.
//!
//! ```text
//! Data frame:
//! +--------+--------------------+-------------------------+
//! | "data" | chunk (<= block)   | pad ('0' x block-chunk) |
//! +--------+--------------------+-------------------------+
//!
//! Terminator frame:
//! +--------+----------------------------------------------+
//! | "stop" | pad ('0' x block)                            |
//! +--------+----------------------------------------------+
//! ```
//!
//! Both kinds are exactly `tag_len + block_size` bytes, so the device can
//! use a single fixed-size receive buffer. Frames only flow host to device;
//! there is no decoder.

use crate::error::{Error, Result};
use crate::protocol::config::ProtocolConfig;

/// Encode one chunk of file content as a data frame.
pub fn encode_data(config: &ProtocolConfig, chunk: &[u8]) -> Result<Vec<u8>> {
    if chunk.len() > config.block_size {
        return Err(Error::Protocol(format!(
            "chunk of {} bytes exceeds block size {}",
            chunk.len(),
            config.block_size
        )));
    }

    let mut frame = Vec::with_capacity(config.frame_len());
    frame.extend_from_slice(config.data_tag.as_bytes());
    frame.extend_from_slice(chunk);
    frame.resize(config.frame_len(), config.pad_byte);
    Ok(frame)
}

/// Encode the terminator frame.
pub fn encode_stop(config: &ProtocolConfig) -> Vec<u8> {
    let mut frame = Vec::with_capacity(config.frame_len());
    frame.extend_from_slice(config.stop_tag.as_bytes());
    frame.resize(config.frame_len(), config.pad_byte);
    frame
}

/// Number of frames needed for `len` payload bytes, or 0 for a zero block size.
pub fn block_count(config: &ProtocolConfig, len: usize) -> usize {
    if config.block_size == 0 {
        return 0;
    }
    len.div_ceil(config.block_size)
}
