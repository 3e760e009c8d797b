//! Serial port selection.
//!
//! Order: explicit `--port`, then the configured port, then discovery by
//! hardware identifier. Several discovered devices prompt with dialoguer,
//! or fail as a usage error in non-interactive mode.

use {
    crate::{CliError, config::Config},
    anyhow::Result,
    console::style,
    dialoguer::{Confirm, Error as DialoguerError, Select, theme::ColorfulTheme},
    log::{debug, error},
    seedcli::{DetectedPort, HardwareId, format_port_list, host},
    std::io::IsTerminal,
};

/// Options for serial port selection.
#[derive(Debug, Clone, Default)]
pub struct SerialOptions {
    /// Explicit port specified on the command line.
    pub port: Option<String>,
    /// Non-interactive mode (fail instead of prompting).
    pub non_interactive: bool,
}

/// Selected port and how it was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedPort {
    /// Port name/path.
    pub name: String,
    /// Whether the port came from discovery rather than flags or config.
    pub discovered: bool,
}

fn usage_err(message: &str) -> anyhow::Error {
    CliError::Usage(message.to_string()).into()
}

/// Select the serial port to open.
pub fn select_serial_port(
    options: &SerialOptions,
    config: &Config,
    id: &HardwareId,
) -> Result<SelectedPort> {
    let preferred = options
        .port
        .as_deref()
        .or(config.connection.port.as_deref());

    if let Some(name) = preferred {
        let source = if options.port.is_some() {
            "command line"
        } else {
            "config"
        };
        debug!("Using port from {source}: {name}");
        return Ok(SelectedPort {
            name: host::resolve_port(Some(name), Vec::new(), id)?,
            discovered: false,
        });
    }

    select_discovered_port(
        host::discover_seed_ports(id),
        options.non_interactive,
        id,
    )
}

fn select_discovered_port(
    ports: Vec<DetectedPort>,
    non_interactive: bool,
    id: &HardwareId,
) -> Result<SelectedPort> {
    if ports.len() > 1 {
        if non_interactive {
            return Err(usage_err(&format!(
                "{} devices match {id}; pass --port to choose one",
                ports.len()
            )));
        }
        ensure_interactive_terminal()?;
        return select_port_interactive(ports);
    }

    Ok(SelectedPort {
        name: host::resolve_port(None, ports, id)?,
        discovered: true,
    })
}

fn ensure_interactive_terminal() -> Result<()> {
    if std::io::stdin().is_terminal() && std::io::stderr().is_terminal() {
        Ok(())
    } else {
        Err(usage_err(
            "several devices found and no terminal to choose from; pass --port",
        ))
    }
}

fn map_prompt_error(err: DialoguerError) -> anyhow::Error {
    match err {
        DialoguerError::IO(io_err) => {
            if io_err.kind() == std::io::ErrorKind::Interrupted {
                CliError::Cancelled("port selection cancelled".to_string()).into()
            } else {
                usage_err(&format!("port prompt failed: {io_err}"))
            }
        },
    }
}

/// Interactive port selection.
fn select_port_interactive(ports: Vec<DetectedPort>) -> Result<SelectedPort> {
    eprintln!(
        "{} {} devices found",
        style("ℹ").blue(),
        ports.len()
    );

    // Truncate labels to fit terminal width to prevent wrapping in narrow
    // terminals.
    let term_width = console::Term::stderr().size().1 as usize;
    let max_item_width = term_width.saturating_sub(4);
    let labels: Vec<String> = format_port_list(&ports)
        .into_iter()
        .map(|n| console::truncate_str(&n, max_item_width, "\u{2026}").into_owned())
        .collect();

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select the device port")
        .items(&labels)
        .default(0)
        .interact_opt()
        .map_err(map_prompt_error)?;

    match selection {
        Some(index) => {
            let port = ports
                .into_iter()
                .nth(index)
                .ok_or_else(|| anyhow::anyhow!("Invalid port index: {index}"))?;
            Ok(SelectedPort {
                name: port.name,
                discovered: true,
            })
        },
        None => Err(CliError::Cancelled("port selection cancelled".to_string()).into()),
    }
}

/// Offer to save a discovered port as the preferred one.
pub fn ask_remember_port(port: &SelectedPort, config: &mut Config) -> Result<()> {
    if !port.discovered || !std::io::stdin().is_terminal() || !std::io::stderr().is_terminal() {
        return Ok(());
    }

    let confirmed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("Remember {} as the default port?", port.name))
        .default(false)
        .interact_opt()
        .map_err(map_prompt_error)?
        .unwrap_or(false);

    if confirmed {
        if let Err(e) = config.remember_port(&port.name) {
            error!("Failed to save port configuration: {e}");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(name: &str) -> DetectedPort {
        DetectedPort {
            vid: Some(0x0483),
            pid: Some(0x5740),
            is_seed: true,
            ..DetectedPort::named(name)
        }
    }

    #[test]
    fn test_explicit_port_wins() {
        let mut config = Config::default();
        config.connection.port = Some("/dev/ttyACM9".to_string());
        let options = SerialOptions {
            port: Some("/dev/ttyUSB0".to_string()),
            non_interactive: true,
        };

        let selected = select_serial_port(&options, &config, &HardwareId::default()).unwrap();
        assert_eq!(selected.name, "/dev/ttyUSB0");
        assert!(!selected.discovered);
    }

    #[test]
    fn test_configured_port_used_without_discovery() {
        let mut config = Config::default();
        config.connection.port = Some("COM7".to_string());

        let selected =
            select_serial_port(&SerialOptions::default(), &config, &HardwareId::default()).unwrap();
        assert_eq!(selected.name, "COM7");
        assert!(!selected.discovered);
    }

    #[test]
    fn test_single_discovered_port_selected() {
        let selected =
            select_discovered_port(vec![seed("/dev/ttyACM0")], true, &HardwareId::default())
                .unwrap();
        assert_eq!(selected.name, "/dev/ttyACM0");
        assert!(selected.discovered);
    }

    #[test]
    fn test_no_ports_is_port_not_found() {
        let err = select_discovered_port(vec![], true, &HardwareId::default()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<seedcli::Error>(),
            Some(seedcli::Error::PortNotFound(_))
        ));
    }

    #[test]
    fn test_non_interactive_multiple_ports_returns_usage_error() {
        let ports = vec![seed("/dev/ttyACM0"), seed("/dev/ttyACM1")];
        let err = select_discovered_port(ports, true, &HardwareId::default()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CliError>(),
            Some(CliError::Usage(_))
        ));
    }

    #[test]
    fn test_remember_skipped_for_explicit_port() {
        let mut config = Config::default();
        let port = SelectedPort {
            name: "/dev/ttyACM0".to_string(),
            discovered: false,
        };
        ask_remember_port(&port, &mut config).unwrap();
        assert!(config.connection.port.is_none());
    }
}
