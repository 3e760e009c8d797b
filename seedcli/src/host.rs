//! Host-side utilities for serial port discovery.

use log::debug;

use crate::device::{DetectedPort, HardwareId, find_seed_port_in};
use crate::error::{Error, Result};

/// Discover all available serial ports.
#[cfg(feature = "native")]
#[must_use]
pub fn discover_ports(id: &HardwareId) -> Vec<DetectedPort> {
    crate::device::detect_ports(id)
}

/// Discover serial ports that match the device's hardware identifier.
#[cfg(feature = "native")]
#[must_use]
pub fn discover_seed_ports(id: &HardwareId) -> Vec<DetectedPort> {
    crate::device::detect_seed_ports(id)
}

/// Resolve the port to open from an already enumerated port list.
///
/// An explicit override wins without looking at `ports`; otherwise the first
/// port classified as the device is used.
pub fn resolve_port(
    override_port: Option<&str>,
    ports: Vec<DetectedPort>,
    id: &HardwareId,
) -> Result<String> {
    if let Some(name) = override_port {
        debug!("Using port override {name}, skipping discovery");
        return Ok(name.to_string());
    }

    find_seed_port_in(ports)
        .map(|port| port.name)
        .ok_or_else(|| Error::PortNotFound(format!("no serial port matches {id}")))
}
