//! Port abstraction for the serial link to the device.
//!
//! The protocol layer only talks to a [`Port`], never to the `serialport`
//! crate directly, so the whole engine can be driven by an in-memory port
//! in tests.
//!
//! ```text
//! +----------------------------+
//! |  SeedClient / transfer     |
//! +-------------+--------------+
//!               |
//!               v
//! +-------------+--------------+
//! |        Port trait          |
//! +-------------+--------------+
//!               |
//!               v
//! +-------------+--------------+
//! |  NativePort (serialport)   |
//! +----------------------------+
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use seedcli::port::Port;
//!
//! fn example<P: Port>(port: &mut P) -> seedcli::Result<()> {
//!     port.write_all_bytes(b"get temp1")?;
//!     let line = port.read_line(256)?;
//!     println!("Received: {line}");
//!     Ok(())
//! }
//! ```

#[cfg(feature = "native")]
pub mod native;

use std::io::{Read, Write};
use std::time::Duration;

use log::trace;

use crate::error::{Error, Result};

/// Serial port configuration.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Port name/path (e.g., "/dev/ttyACM0", "COM3").
    pub port_name: String,
    /// Baud rate. USB CDC devices ignore it, but the OS still wants one.
    pub baud_rate: u32,
    /// Read/write timeout.
    pub timeout: Duration,
    /// Data bits (typically 8).
    pub data_bits: DataBits,
    /// Parity (typically None).
    pub parity: Parity,
    /// Stop bits (typically One).
    pub stop_bits: StopBits,
    /// Flow control (typically None).
    pub flow_control: FlowControl,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: DEFAULT_BAUD,
            timeout: Duration::from_millis(1000),
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
        }
    }
}

/// Default baud rate of the device's virtual COM port.
pub const DEFAULT_BAUD: u32 = 115200;

impl SerialConfig {
    /// Create a new configuration with port name and baud rate.
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            ..Default::default()
        }
    }
}

/// Number of data bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataBits {
    /// 7 data bits.
    Seven,
    /// 8 data bits.
    #[default]
    Eight,
}

/// Parity checking mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Parity {
    /// No parity.
    #[default]
    None,
    /// Odd parity.
    Odd,
    /// Even parity.
    Even,
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopBits {
    /// 1 stop bit.
    #[default]
    One,
    /// 2 stop bits.
    Two,
}

/// Flow control mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlowControl {
    /// No flow control.
    #[default]
    None,
    /// Hardware flow control (RTS/CTS).
    Hardware,
    /// Software flow control (XON/XOFF).
    Software,
}

/// Serial port information.
#[derive(Debug, Clone, Default)]
pub struct PortInfo {
    /// Port name/path.
    pub name: String,
    /// USB vendor ID (if available).
    pub vid: Option<u16>,
    /// USB product ID (if available).
    pub pid: Option<u16>,
    /// Manufacturer string (if available).
    pub manufacturer: Option<String>,
    /// Product string (if available).
    pub product: Option<String>,
    /// Serial number (if available).
    pub serial_number: Option<String>,
}

/// Unified port trait for the serial link.
pub trait Port: Read + Write + Send {
    /// Read timeout, reported when no reply arrives.
    fn timeout(&self) -> Duration;

    /// Clear input/output buffers.
    fn clear_buffers(&mut self) -> Result<()>;

    /// Get the port name/path.
    fn name(&self) -> &str;

    /// Close the port and release resources.
    ///
    /// After calling this method, the port cannot be used for further I/O.
    /// Closing an already closed port is a no-op.
    fn close(&mut self) -> Result<()>;

    /// Write all bytes, blocking until complete.
    fn write_all_bytes(&mut self, buf: &[u8]) -> Result<()> {
        trace!("-> {} bytes: {:?}", buf.len(), String::from_utf8_lossy(buf));
        std::io::Write::write_all(self, buf)?;
        std::io::Write::flush(self)?;
        Ok(())
    }

    /// Read one line, up to and including `\n`, decoded lossily as UTF-8.
    ///
    /// Reading stops after `max_len` bytes even without a newline. A timeout
    /// after at least one byte returns the partial line; a timeout before
    /// any byte arrives is [`Error::Timeout`].
    fn read_line(&mut self, max_len: usize) -> Result<String> {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];

        while line.len() < max_len {
            match self.read(&mut byte) {
                Ok(1) => {
                    line.push(byte[0]);
                    if byte[0] == b'\n' {
                        break;
                    }
                },
                Ok(_) => break,
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => break,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {},
                Err(e) => return Err(Error::Io(e)),
            }
        }

        if line.is_empty() {
            return Err(Error::Timeout(format!(
                "no response on {} within {:?}",
                self.name(),
                self.timeout()
            )));
        }

        let text = String::from_utf8_lossy(&line).into_owned();
        trace!("<- {text:?}");
        Ok(text)
    }
}

/// Trait for listing available serial ports.
///
/// This is separated from `Port` because it's a static operation that
/// doesn't require an open port instance.
pub trait PortEnumerator {
    /// List all available serial ports.
    fn list_ports() -> Result<Vec<PortInfo>>;
}

#[cfg(feature = "native")]
pub use native::{NativePort, NativePortEnumerator};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockPort;

    #[test]
    fn test_read_line_stops_at_newline() {
        let mut port = MockPort::new(b"[SEED]: OK\n\r[SEED]: ERR\n\r");
        assert_eq!(port.read_line(256).unwrap(), "[SEED]: OK\n");
        assert_eq!(port.read_line(256).unwrap(), "\r[SEED]: ERR\n");
        assert_eq!(port.read_line(256).unwrap(), "\r");
    }

    #[test]
    fn test_read_line_partial_on_timeout() {
        let mut port = MockPort::new(b"[SEED]: OK");
        assert_eq!(port.read_line(256).unwrap(), "[SEED]: OK");
    }

    #[test]
    fn test_read_line_timeout_without_data() {
        let mut port = MockPort::new(b"");
        assert!(matches!(port.read_line(256), Err(Error::Timeout(_))));
    }

    #[test]
    fn test_read_line_respects_max_len() {
        let mut port = MockPort::new(b"abcdefgh\n");
        assert_eq!(port.read_line(4).unwrap(), "abcd");
    }

    #[test]
    fn test_write_all_bytes_records_write() {
        let mut port = MockPort::new(b"");
        port.write_all_bytes(b"get temp1").unwrap();
        assert_eq!(port.written(), b"get temp1");
    }

    #[test]
    fn test_serial_config_default() {
        let config = SerialConfig::default();
        assert_eq!(config.baud_rate, 115200);
        assert_eq!(config.data_bits, DataBits::Eight);
        assert_eq!(config.parity, Parity::None);
        assert_eq!(config.stop_bits, StopBits::One);
        assert_eq!(config.flow_control, FlowControl::None);
    }

    #[test]
    fn test_serial_config_new() {
        let config = SerialConfig::new("/dev/ttyACM0", 9600);

        assert_eq!(config.port_name, "/dev/ttyACM0");
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.timeout, Duration::from_millis(1000));
    }
}
