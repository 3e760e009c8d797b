//! Request/response client over one open port.

use log::{debug, warn};

use crate::error::{Error, Result};
use crate::files::FileAccess;
use crate::port::Port;
use crate::protocol::command::Command;
use crate::protocol::config::ProtocolConfig;
use crate::protocol::response::{Response, Status};
use crate::protocol::transfer::{self, TransferReport, UploadOutcome, device_text};

#[cfg(feature = "native")]
use crate::port::{NativePort, SerialConfig};

/// Successful result of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Get/Set answered OK; the text after the status token.
    Value(String),
    /// Send answered OK straight away; no data was transferred.
    Skipped {
        /// Device message.
        message: String,
    },
    /// Send completed with a verified checksum.
    Uploaded(TransferReport),
}

/// Client for one device session.
///
/// The port is closed by [`SeedClient::close`] or, failing that, on drop, so
/// every exit path releases the device.
pub struct SeedClient<P: Port> {
    port: P,
    config: ProtocolConfig,
}

impl<P: Port> SeedClient<P> {
    /// Wrap an open port. Fails if `config` cannot describe a usable protocol.
    pub fn new(port: P, config: ProtocolConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { port, config })
    }

    /// Protocol configuration in use.
    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// Underlying port.
    pub fn port(&self) -> &P {
        &self.port
    }

    /// One round trip: write `request`, wait the settle delay, read one line.
    pub fn transceive(&mut self, request: &[u8]) -> Result<Response> {
        transfer::transceive(&mut self.port, &self.config, request)
    }

    /// Run `command` against the device.
    ///
    /// `progress(bytes_sent, total)` is only called for uploads.
    pub fn execute<F, G>(&mut self, command: &Command, files: &F, progress: G) -> Result<Outcome>
    where
        F: FileAccess + ?Sized,
        G: FnMut(usize, usize),
    {
        match command {
            Command::Get { .. } | Command::Set { .. } => self.exchange(command),
            Command::Send {
                path,
                storage,
                length,
            } => {
                let payload = files.read_all(path)?;
                let actual = payload.len() as u64;
                if actual != *length {
                    return Err(Error::FileChanged {
                        path: path.clone(),
                        announced: *length,
                        actual,
                    });
                }

                match transfer::upload(&mut self.port, &self.config, *storage, &payload, progress)? {
                    UploadOutcome::Skipped { message } => Ok(Outcome::Skipped { message }),
                    UploadOutcome::Completed(report) => Ok(Outcome::Uploaded(report)),
                }
            },
            Command::Data { .. } | Command::Stop => Err(Error::Protocol(format!(
                "<{}> is only sent during an upload",
                command.name()
            ))),
        }
    }

    fn exchange(&mut self, command: &Command) -> Result<Outcome> {
        debug!("Sending <{}> {:?}", command.name(), command.args());
        let response = self.transceive(&command.encode(&self.config)?)?;

        match response.status {
            Status::Ok => Ok(Outcome::Value(response.text)),
            Status::Error => Err(Error::Device(device_text(&response))),
            Status::Finished | Status::Unrecognized => Err(Error::UnexpectedResponse {
                step: command.name(),
                expected: "OK",
                actual: response.line,
            }),
        }
    }

    /// Release the port.
    pub fn close(&mut self) -> Result<()> {
        self.port.close()
    }
}

#[cfg(feature = "native")]
impl SeedClient<NativePort> {
    /// Open `port_name` and wrap it.
    pub fn open(port_name: &str, baud_rate: u32, config: ProtocolConfig) -> Result<Self> {
        log::info!("Opening {port_name} at {baud_rate} baud");
        let mut port = NativePort::open(&SerialConfig::new(port_name, baud_rate))?;
        port.clear_buffers()?;
        Self::new(port, config)
    }
}

impl<P: Port> Drop for SeedClient<P> {
    fn drop(&mut self) {
        if let Err(e) = self.port.close() {
            warn!("Failed to close {}: {e}", self.port.name());
        }
    }
}
