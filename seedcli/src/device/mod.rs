//! Device discovery.
//!
//! The device enumerates as a USB CDC virtual COM port. It is recognized
//! purely by its USB hardware identifier, written the way OS port listings
//! print it: `VID:PID=0483:5740`.

use std::fmt;
use std::str::FromStr;

use log::{debug, info, trace};

use crate::error::{Error, Result};
use crate::port::{PortEnumerator, PortInfo};

/// USB vendor/product pair identifying the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HardwareId {
    /// USB Vendor ID.
    pub vid: u16,
    /// USB Product ID.
    pub pid: u16,
}

impl HardwareId {
    /// STM32 virtual COM port, as exposed by the Daisy Seed firmware.
    pub const DAISY_SEED: Self = Self {
        vid: 0x0483,
        pid: 0x5740,
    };

    /// Check if this identifier matches the given USB info.
    pub fn matches(&self, vid: u16, pid: u16) -> bool {
        self.vid == vid && self.pid == pid
    }
}

impl Default for HardwareId {
    fn default() -> Self {
        Self::DAISY_SEED
    }
}

impl fmt::Display for HardwareId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VID:PID={:04X}:{:04X}", self.vid, self.pid)
    }
}

impl FromStr for HardwareId {
    type Err = Error;

    /// Accepts `VID:PID=0483:5740` or the bare `0483:5740` form.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let pair = s
            .strip_prefix("VID:PID=")
            .or_else(|| s.strip_prefix("vid:pid="))
            .unwrap_or(s);

        let (vid, pid) = pair
            .split_once(':')
            .ok_or_else(|| Error::Config(format!("invalid hardware id '{s}'")))?;

        let parse = |part: &str| {
            u16::from_str_radix(part.trim(), 16)
                .map_err(|e| Error::Config(format!("invalid hardware id '{s}': {e}")))
        };

        Ok(Self {
            vid: parse(vid)?,
            pid: parse(pid)?,
        })
    }
}

/// Discovered serial port information.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DetectedPort {
    /// Port name/path (e.g., "/dev/ttyACM0" or "COM3").
    pub name: String,
    /// USB Vendor ID (if available).
    pub vid: Option<u16>,
    /// USB Product ID (if available).
    pub pid: Option<u16>,
    /// Device manufacturer string (if available).
    pub manufacturer: Option<String>,
    /// Device product string (if available).
    pub product: Option<String>,
    /// Serial number (if available).
    pub serial: Option<String>,
    /// Whether the port matched the device's hardware identifier.
    pub is_seed: bool,
}

impl DetectedPort {
    /// Classify a listed port against a hardware identifier.
    pub fn classify(info: PortInfo, id: &HardwareId) -> Self {
        let is_seed = matches!((info.vid, info.pid), (Some(vid), Some(pid)) if id.matches(vid, pid));

        Self {
            name: info.name,
            vid: info.vid,
            pid: info.pid,
            manufacturer: info.manufacturer,
            product: info.product,
            serial: info.serial_number,
            is_seed,
        }
    }

    /// A port that was named explicitly and not found in the OS listing.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vid: None,
            pid: None,
            manufacturer: None,
            product: None,
            serial: None,
            is_seed: false,
        }
    }

    /// `VID:PID=xxxx:xxxx` if USB info is available.
    pub fn hardware_id(&self) -> Option<HardwareId> {
        match (self.vid, self.pid) {
            (Some(vid), Some(pid)) => Some(HardwareId { vid, pid }),
            _ => None,
        }
    }
}

/// Detect all ports reported by `E`, classified against `id`.
pub fn detect_ports_with<E: PortEnumerator>(id: &HardwareId) -> Vec<DetectedPort> {
    match E::list_ports() {
        Ok(ports) => ports
            .into_iter()
            .map(|info| {
                let detected = DetectedPort::classify(info, id);
                trace!(
                    "Found port: {} (hwid: {}, seed: {})",
                    detected.name,
                    detected
                        .hardware_id()
                        .map_or_else(|| "n/a".to_string(), |h| h.to_string()),
                    detected.is_seed
                );
                detected
            })
            .collect(),
        Err(e) => {
            debug!("Failed to enumerate serial ports: {e}");
            Vec::new()
        },
    }
}

/// Detect all available serial ports.
#[cfg(feature = "native")]
pub fn detect_ports(id: &HardwareId) -> Vec<DetectedPort> {
    detect_ports_with::<crate::port::NativePortEnumerator>(id)
}

/// Detect ports matching the device's hardware identifier.
#[cfg(feature = "native")]
pub fn detect_seed_ports(id: &HardwareId) -> Vec<DetectedPort> {
    detect_ports(id)
        .into_iter()
        .filter(|p| p.is_seed)
        .collect()
}

/// Pick the first port classified as the device, if any.
pub fn find_seed_port_in(ports: Vec<DetectedPort>) -> Option<DetectedPort> {
    let port = ports.into_iter().find(|p| p.is_seed)?;
    info!("Auto-detected device on {}", port.name);
    Some(port)
}

/// Find the first serial port matching the device's hardware identifier.
#[cfg(feature = "native")]
pub fn find_seed_port(id: &HardwareId) -> Option<DetectedPort> {
    find_seed_port_in(detect_ports(id))
}

/// Format a list of detected ports for display.
pub fn format_port_list(ports: &[DetectedPort]) -> Vec<String> {
    ports
        .iter()
        .map(|port| {
            let device_info = match (port.is_seed, port.hardware_id()) {
                (true, _) => " [Daisy Seed]".to_string(),
                (false, Some(id)) => format!(" [{id}]"),
                (false, None) => String::new(),
            };

            let product_info = port
                .product
                .as_ref()
                .map(|p| format!(" - {p}"))
                .unwrap_or_default();

            format!("{}{}{}", port.name, device_info, product_info)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeEnumerator;

    impl PortEnumerator for FakeEnumerator {
        fn list_ports() -> Result<Vec<PortInfo>> {
            Ok(vec![
                PortInfo {
                    name: "/dev/ttyS0".into(),
                    ..PortInfo::default()
                },
                PortInfo {
                    name: "/dev/ttyUSB0".into(),
                    vid: Some(0x1A86),
                    pid: Some(0x7523),
                    ..PortInfo::default()
                },
                PortInfo {
                    name: "/dev/ttyACM0".into(),
                    vid: Some(0x0483),
                    pid: Some(0x5740),
                    product: Some("Daisy Seed Built In".into()),
                    ..PortInfo::default()
                },
            ])
        }
    }

    #[test]
    fn test_hardware_id_parse_forms() {
        let full: HardwareId = "VID:PID=0483:5740".parse().unwrap();
        let bare: HardwareId = "0483:5740".parse().unwrap();
        assert_eq!(full, HardwareId::DAISY_SEED);
        assert_eq!(bare, HardwareId::DAISY_SEED);
    }

    #[test]
    fn test_hardware_id_parse_invalid() {
        assert!("0483".parse::<HardwareId>().is_err());
        assert!("VID:PID=zz:5740".parse::<HardwareId>().is_err());
        assert!("VID:PID=10000:5740".parse::<HardwareId>().is_err());
    }

    #[test]
    fn test_hardware_id_display() {
        assert_eq!(HardwareId::DAISY_SEED.to_string(), "VID:PID=0483:5740");
    }

    #[test]
    fn test_detect_classifies_by_hardware_id() {
        let ports = detect_ports_with::<FakeEnumerator>(&HardwareId::DAISY_SEED);
        assert_eq!(ports.len(), 3);
        assert!(!ports[0].is_seed);
        assert!(!ports[1].is_seed);
        assert!(ports[2].is_seed);
    }

    #[test]
    fn test_find_seed_port_in() {
        let ports = detect_ports_with::<FakeEnumerator>(&HardwareId::DAISY_SEED);
        let found = find_seed_port_in(ports).unwrap();
        assert_eq!(found.name, "/dev/ttyACM0");

        let other = HardwareId {
            vid: 0xFFFF,
            pid: 0x0001,
        };
        let ports = detect_ports_with::<FakeEnumerator>(&other);
        assert!(find_seed_port_in(ports).is_none());
    }

    #[test]
    fn test_format_port_list() {
        let ports = detect_ports_with::<FakeEnumerator>(&HardwareId::DAISY_SEED);
        let formatted = format_port_list(&ports);
        assert_eq!(formatted[0], "/dev/ttyS0");
        assert_eq!(formatted[1], "/dev/ttyUSB0 [VID:PID=1A86:7523]");
        assert_eq!(formatted[2], "/dev/ttyACM0 [Daisy Seed] - Daisy Seed Built In");
    }

    #[test]
    fn test_named_port_is_not_seed() {
        let port = DetectedPort::named("COM7");
        assert_eq!(port.name, "COM7");
        assert!(!port.is_seed);
        assert!(port.hardware_id().is_none());
    }
}
