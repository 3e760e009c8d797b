//! Configuration file support for seedcli.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (SEEDCLI_*)
//! 3. Local config file (./seedcli.toml)
//! 4. Global config file (~/.config/seedcli/config.toml)

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use directories::ProjectDirs;
use log::{debug, info, warn};
use seedcli::{HardwareId, ProtocolConfig};
use serde::{Deserialize, Serialize};

/// Local configuration file name.
pub const LOCAL_CONFIG_FILE: &str = "seedcli.toml";

/// Connection configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Preferred serial port (e.g., "/dev/ttyACM0" or "COM3").
    pub port: Option<String>,
    /// Baud rate.
    pub baud: Option<u32>,
    /// USB identifier used for discovery, e.g. "VID:PID=0483:5740".
    pub hardware_id: Option<String>,
}

/// Protocol overrides, for firmware built with different constants.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProtocolSection {
    /// Payload bytes per upload frame.
    pub block_size: Option<usize>,
    /// Wait between a write and the following read.
    pub settle_delay_ms: Option<u64>,
    /// Reflected CRC-16 polynomial.
    pub crc_polynomial: Option<u16>,
    /// CRC-16 initial value.
    pub crc_initial: Option<u16>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Connection configuration.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Protocol configuration.
    #[serde(default)]
    pub protocol: ProtocolSection,
}

impl Config {
    /// Load configuration from all available sources.
    pub fn load() -> Self {
        let mut config = Self::default();

        // Load global config
        if let Some(global_path) = Self::global_config_path() {
            if let Some(global_config) = Self::load_from_file(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global_config);
            }
        }

        // Load local config (overrides global)
        if let Some(local_config) = Self::load_from_file(Path::new(LOCAL_CONFIG_FILE)) {
            debug!("Loaded local config from {LOCAL_CONFIG_FILE}");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
            config
        } else {
            warn!(
                "Could not load config from {}, using defaults",
                path.display()
            );
            Self::default()
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "seedcli").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one.
    fn merge(&mut self, other: Self) {
        let Self {
            connection,
            protocol,
        } = other;

        if connection.port.is_some() {
            self.connection.port = connection.port;
        }
        if connection.baud.is_some() {
            self.connection.baud = connection.baud;
        }
        if connection.hardware_id.is_some() {
            self.connection.hardware_id = connection.hardware_id;
        }

        if protocol.block_size.is_some() {
            self.protocol.block_size = protocol.block_size;
        }
        if protocol.settle_delay_ms.is_some() {
            self.protocol.settle_delay_ms = protocol.settle_delay_ms;
        }
        if protocol.crc_polynomial.is_some() {
            self.protocol.crc_polynomial = protocol.crc_polynomial;
        }
        if protocol.crc_initial.is_some() {
            self.protocol.crc_initial = protocol.crc_initial;
        }
    }

    /// Hardware identifier used for discovery.
    pub fn hardware_id(&self) -> anyhow::Result<HardwareId> {
        match &self.connection.hardware_id {
            Some(id) => id
                .parse()
                .with_context(|| format!("Invalid [connection] hardware_id '{id}'")),
            None => Ok(HardwareId::default()),
        }
    }

    /// Protocol configuration with the `[protocol]` overrides applied.
    pub fn protocol_config(&self) -> anyhow::Result<ProtocolConfig> {
        let mut protocol = ProtocolConfig::default();
        let section = &self.protocol;

        if let Some(block_size) = section.block_size {
            protocol = protocol.with_block_size(block_size);
        }
        if let Some(ms) = section.settle_delay_ms {
            protocol = protocol.with_settle_delay(Duration::from_millis(ms));
        }
        let polynomial = section
            .crc_polynomial
            .unwrap_or(protocol.crc_polynomial);
        let initial = section.crc_initial.unwrap_or(protocol.crc_initial);
        protocol = protocol.with_crc(polynomial, initial);

        protocol
            .validate()
            .context("Invalid [protocol] configuration")?;
        Ok(protocol)
    }

    /// Remember `port` as the preferred port.
    ///
    /// Writes to the local config file when one exists, otherwise to the
    /// global one.
    pub fn remember_port(&mut self, port: &str) -> anyhow::Result<PathBuf> {
        let local = Path::new(LOCAL_CONFIG_FILE);
        let path = if local.exists() {
            local.to_path_buf()
        } else if let Some(global_dir) = Self::global_config_dir() {
            fs::create_dir_all(&global_dir)?;
            global_dir.join("config.toml")
        } else {
            local.to_path_buf()
        };

        self.save_port_to(&path, port)?;
        self.connection.port = Some(port.to_string());
        Ok(path)
    }

    /// Set `[connection] port` in the file at `path`, keeping its other settings.
    fn save_port_to(&self, path: &Path, port: &str) -> anyhow::Result<()> {
        let mut stored = Self::load_from_file(path).unwrap_or_default();
        stored.connection.port = Some(port.to_string());

        let content = toml::to_string_pretty(&stored)?;
        fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Saved port {port} to {}", path.display());

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ---- Default values ----

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.connection.port.is_none());
        assert!(config.connection.baud.is_none());
        assert!(config.connection.hardware_id.is_none());
        assert!(config.protocol.block_size.is_none());
        assert!(config.protocol.settle_delay_ms.is_none());
    }

    #[test]
    fn test_default_protocol_config() {
        let protocol = Config::default().protocol_config().unwrap();
        assert_eq!(protocol.block_size, 60);
        assert_eq!(protocol.crc_polynomial, 0x8408);
        assert_eq!(protocol.crc_initial, 0xFFFF);
    }

    #[test]
    fn test_default_hardware_id() {
        let id = Config::default().hardware_id().unwrap();
        assert_eq!(id, HardwareId::DAISY_SEED);
    }

    // ---- Config merge ----

    #[test]
    fn test_config_merge_port() {
        let mut base = Config::default();
        let mut other = Config::default();
        other.connection.port = Some("/dev/ttyACM0".to_string());
        other.protocol.block_size = Some(512);

        base.merge(other);

        assert_eq!(base.connection.port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(base.protocol.block_size, Some(512));
    }

    #[test]
    fn test_config_merge_baud() {
        let mut base = Config::default();
        base.connection.baud = Some(115200);

        let mut other = Config::default();
        other.connection.baud = Some(9600);

        base.merge(other);
        assert_eq!(base.connection.baud, Some(9600));
    }

    #[test]
    fn test_config_merge_does_not_overwrite_with_none() {
        let mut base = Config::default();
        base.connection.port = Some("/dev/ttyACM0".to_string());
        base.connection.baud = Some(115200);
        base.protocol.crc_initial = Some(0);

        let other = Config::default(); // all None
        base.merge(other);

        assert_eq!(base.connection.port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(base.connection.baud, Some(115200));
        assert_eq!(base.protocol.crc_initial, Some(0));
    }

    // ---- TOML ----

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
[connection]
port = "/dev/ttyACM0"
baud = 115200
hardware_id = "VID:PID=0483:5740"

[protocol]
block_size = 512
settle_delay_ms = 5
crc_polynomial = 0x8408
crc_initial = 0xFFFF
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.connection.port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(config.connection.baud, Some(115200));
        assert_eq!(config.hardware_id().unwrap(), HardwareId::DAISY_SEED);

        let protocol = config.protocol_config().unwrap();
        assert_eq!(protocol.block_size, 512);
        assert_eq!(protocol.settle_delay, Duration::from_millis(5));
        assert_eq!(protocol.crc_polynomial, 0x8408);
    }

    #[test]
    fn test_config_from_empty_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.connection.port.is_none());
        assert!(config.protocol.block_size.is_none());
    }

    #[test]
    fn test_invalid_block_size_rejected() {
        let config: Config = toml::from_str("[protocol]\nblock_size = 0\n").unwrap();
        assert!(config.protocol_config().is_err());
    }

    #[test]
    fn test_invalid_hardware_id_rejected() {
        let config: Config = toml::from_str("[connection]\nhardware_id = \"nope\"\n").unwrap();
        assert!(config.hardware_id().is_err());
    }

    // ---- Files ----

    #[test]
    fn test_load_from_path_valid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seedcli.toml");
        fs::write(
            &path,
            r#"
[connection]
port = "/dev/ttyACM1"
[protocol]
block_size = 128
"#,
        )
        .unwrap();

        let config = Config::load_from_path(&path);
        assert_eq!(config.connection.port.as_deref(), Some("/dev/ttyACM1"));
        assert_eq!(config.protocol.block_size, Some(128));
    }

    #[test]
    fn test_load_from_path_nonexistent() {
        let config = Config::load_from_path(Path::new("/nonexistent/path/config.toml"));
        assert!(config.connection.port.is_none());
    }

    #[test]
    fn test_load_from_path_malformed_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seedcli.toml");
        fs::write(&path, "invalid toml [[[").unwrap();

        let config = Config::load_from_path(&path);
        assert!(config.connection.port.is_none());
    }

    #[test]
    fn test_save_port_keeps_other_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seedcli.toml");
        fs::write(&path, "[protocol]\nblock_size = 256\n").unwrap();

        Config::default()
            .save_port_to(&path, "/dev/ttyACM2")
            .unwrap();

        let saved = Config::load_from_path(&path);
        assert_eq!(saved.connection.port.as_deref(), Some("/dev/ttyACM2"));
        assert_eq!(saved.protocol.block_size, Some(256));
    }

    #[test]
    fn test_global_config_path() {
        if let Some(p) = Config::global_config_path() {
            assert!(p.to_str().unwrap().contains("seedcli"));
            assert!(p.to_str().unwrap().ends_with("config.toml"));
        }
    }
}
