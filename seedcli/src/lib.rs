//! # seedcli
//!
//! Host-side client for the Daisy Seed serial command protocol.
//!
//! This crate talks to the device over a USB serial link and provides:
//!
//! - A command model for `get`, `set` and `send` requests
//! - Response line classification (`OK`, `ERROR`, `FINISHED`)
//! - Fixed-length framing for uploads
//! - A CRC-16 running checksum matching the firmware
//! - A block-by-block upload state machine with checksum verification
//!
//! ## Supported Platforms
//!
//! - **Native** (default): Linux, macOS, Windows via the `serialport` crate
//!
//! ## Features
//!
//! - `native` (default): Native serial port support
//! - `serde`: Serialization support for configuration and port listings
//!
//! ## Example
//!
//! ```rust,no_run
//! use seedcli::{Command, Outcome, ProtocolConfig, StdFiles};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ProtocolConfig::default();
//!     let parsed = Command::parse("send", &["firmware.bin", "--qspi"], &StdFiles, &config)?;
//!
//!     #[cfg(feature = "native")]
//!     {
//!         let id = seedcli::HardwareId::default();
//!         let port = seedcli::find_seed_port(&id).ok_or("no device found")?;
//!         let mut client = seedcli::SeedClient::open(&port.name, 115200, config)?;
//!
//!         let outcome = client.execute(&parsed.command, &StdFiles, |sent, total| {
//!             println!("Uploaded {sent}/{total} bytes");
//!         })?;
//!         if let Outcome::Uploaded(report) = outcome {
//!             println!("Checksum {}", report.checksum);
//!         }
//!         client.close()?;
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::{Arc, OnceLock};

pub mod client;
pub mod device;
pub mod error;
pub mod files;
pub mod host;
pub mod port;
pub mod protocol;

#[cfg(test)]
pub(crate) mod test_support;

static INTERRUPT_CHECKER: OnceLock<Arc<dyn Fn() -> bool + Send + Sync>> = OnceLock::new();

/// Register a global interruption checker used by the upload loop.
///
/// The checker should return `true` when the current upload should stop
/// (for example after receiving Ctrl-C in CLI applications). Only the first
/// registration takes effect.
pub fn set_interrupt_checker<F>(checker: F)
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    let _ = INTERRUPT_CHECKER.set(Arc::new(checker));
}

/// Returns whether interruption was requested by the embedding application.
#[must_use]
pub fn is_interrupted_requested() -> bool {
    INTERRUPT_CHECKER
        .get()
        .is_some_and(|checker| checker())
}

// Re-exports for convenience
// Native-specific re-exports
#[cfg(feature = "native")]
pub use {
    device::{detect_ports, detect_seed_ports, find_seed_port},
    port::{NativePort, NativePortEnumerator},
};
pub use {
    client::{Outcome, SeedClient},
    device::{DetectedPort, HardwareId, format_port_list},
    error::{Error, Result},
    files::{FileAccess, StdFiles},
    port::{Port, PortEnumerator, PortInfo, SerialConfig},
    protocol::{
        Command, ParsedCommand, ProtocolConfig, Response, Status, Storage, TransferReport,
        TransferState, UploadOutcome,
    },
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupt_checker_default_false() {
        // Nothing in the library registers a checker on its own.
        assert!(!is_interrupted_requested());
    }
}
