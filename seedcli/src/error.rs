//! Error types for seedcli.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for seedcli operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for seedcli operations.
///
/// None of these are fatal to the process: each describes one failed
/// operation over the serial link, and the caller is expected to re-run
/// the whole command.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (serial port, file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// No response from the device in time.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Invalid protocol configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Protocol misuse on the host side.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Command name is not one of get/set/send.
    #[error("Unsupported command name: {0}")]
    UnknownCommand(String),

    /// Wrong number of positional arguments (or storage flags).
    #[error("<{command}> {usage} (got {actual})")]
    InvalidCommandArity {
        /// Command name.
        command: &'static str,
        /// Human-readable usage hint.
        usage: &'static str,
        /// Number of arguments actually supplied.
        actual: usize,
    },

    /// Flag not in the command's whitelist. All flags of the command are dropped.
    #[error("Unsupported flag <{flag}> for <{command}>, ignoring all flags")]
    UnknownFlag {
        /// Command name.
        command: &'static str,
        /// The offending flag.
        flag: String,
    },

    /// Source file does not exist.
    #[error("File <{}> does not exist", .0.display())]
    FileNotFound(PathBuf),

    /// Source file changed size between the send request and the upload.
    #[error("File <{}> changed size: announced {announced} bytes, read {actual} bytes", path.display())]
    FileChanged {
        /// Path of the file.
        path: PathBuf,
        /// Length sent in the send request.
        announced: u64,
        /// Length read for the upload.
        actual: u64,
    },

    /// No usable serial port.
    #[error("Device not found: {0}")]
    PortNotFound(String),

    /// Device answered with an ERROR status.
    #[error("Device returned an error: {0}")]
    Device(String),

    /// Device answered with a status other than the one expected at this step.
    #[error("Unexpected response during {step}: expected {expected}, got {actual:?}")]
    UnexpectedResponse {
        /// Protocol step.
        step: &'static str,
        /// Expected status.
        expected: &'static str,
        /// Verbatim response line.
        actual: String,
    },

    /// A data block was not acknowledged with OK. The transfer stopped at this block.
    #[error("Block {block}/{total} was not acknowledged: {response:?} (checksum so far {checksum})")]
    EarlyBlockFailure {
        /// 1-based block number.
        block: usize,
        /// Total number of blocks.
        total: usize,
        /// Verbatim response line.
        response: String,
        /// Host checksum over the blocks sent so far.
        checksum: u16,
    },

    /// Terminator sent but FINISHED not received.
    #[error("Device did not terminate the connection properly: {0:?}")]
    ImproperTermination(String),

    /// FINISHED received but the device checksum differs from the host checksum.
    #[error("Checksum mismatch, data may be corrupted: host {host}, device {device:?}")]
    ChecksumMismatch {
        /// Host-computed checksum.
        host: u16,
        /// Checksum text reported by the device.
        device: String,
    },

    /// Operation stopped by the embedding application.
    #[error("Interrupted")]
    Interrupted,
}
