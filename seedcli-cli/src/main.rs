//! seedcli - Command-line tool for the Daisy Seed serial protocol.
//!
//! ## Features
//!
//! - Read and write device parameters
//! - Upload files to SDRAM or QSPI with checksum verification
//! - Interactive serial port selection
//! - Shell completion generation
//! - Environment variable and config file support

use std::env;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use console::style;
use env_logger::Env;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::debug;
use seedcli::{Command, Outcome, SeedClient, StdFiles, port::DEFAULT_BAUD};

mod config;
mod serial;

use config::Config;
use serial::{SerialOptions, ask_remember_port, select_serial_port};

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Set by the Ctrl-C handler.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Check if progress animations should be used (TTY and colors enabled).
fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// Errors classified by the CLI itself rather than the library.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Bad invocation; exit code 2.
    #[error("{0}")]
    Usage(String),
    /// Stopped by the user; exit code 130.
    #[error("{0}")]
    Cancelled(String),
}

/// seedcli - Talk to a Daisy Seed over its USB serial port.
///
/// Environment variables:
///   SEEDCLI_PORT              - Default serial port
///   SEEDCLI_BAUD              - Default baud rate (default: 115200)
///   SEEDCLI_NON_INTERACTIVE   - Non-interactive mode (disable prompts)
#[derive(Parser)]
#[command(name = "seedcli")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(after_help = "Examples:\n  seedcli get temp1\n  seedcli set gain 10\n  seedcli send firmware.bin --qspi")]
struct Cli {
    /// Serial port to use (auto-detected if not specified).
    #[arg(short, long, global = true, env = "SEEDCLI_PORT")]
    port: Option<String>,

    /// Baud rate.
    #[arg(short, long, global = true, env = "SEEDCLI_BAUD")]
    baud: Option<u32>,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Non-interactive mode (fail instead of prompting).
    #[arg(long, global = true, env = "SEEDCLI_NON_INTERACTIVE")]
    non_interactive: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Read one or more device parameters.
    Get {
        /// Parameter names.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "NAME")]
        tokens: Vec<String>,
    },

    /// Write one device parameter.
    Set {
        /// Target and value.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "TARGET VALUE")]
        tokens: Vec<String>,
    },

    /// Upload a file to the device (--sdram by default, or --qspi).
    Send {
        /// File to upload and an optional storage flag.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "FILE")]
        tokens: Vec<String>,
    },

    /// List available serial ports.
    ListPorts {
        /// Output port list as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type.
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl Commands {
    /// Device command name and raw tokens, for get/set/send.
    fn device_request(&self) -> Option<(&'static str, &[String])> {
        match self {
            Self::Get { tokens } => Some((seedcli::protocol::command::CMD_GET, tokens)),
            Self::Set { tokens } => Some((seedcli::protocol::command::CMD_SET, tokens)),
            Self::Send { tokens } => Some((seedcli::protocol::command::CMD_SEND, tokens)),
            Self::ListPorts { .. } | Self::Completions { .. } => None,
        }
    }

    fn tokens_mut(&mut self) -> Option<&mut Vec<String>> {
        match self {
            Self::Get { tokens } | Self::Set { tokens } | Self::Send { tokens } => Some(tokens),
            Self::ListPorts { .. } | Self::Completions { .. } => None,
        }
    }
}

fn main() -> ExitCode {
    // --- NO_COLOR and TTY detection ---
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);

    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let mut cli = Cli::parse();
    if let Err(err) = cli.lift_trailing_globals() {
        eprintln!("{} {err}", style("Error:").red().bold());
        return ExitCode::from(2);
    }

    // Setup logging based on verbosity
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();

    debug!(
        "seedcli v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    if let Err(e) = ctrlc::set_handler(|| INTERRUPTED.store(true, Ordering::SeqCst)) {
        debug!("Could not install Ctrl-C handler: {e}");
    }
    seedcli::set_interrupt_checker(|| INTERRUPTED.load(Ordering::SeqCst));

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err:#}", style("Error:").red().bold());
            ExitCode::from(exit_code(&err))
        },
    }
}

fn run(cli: &Cli) -> Result<()> {
    // Load configuration
    let mut config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    match &cli.command {
        Commands::ListPorts { json } => cmd_list_ports(&config, *json),
        Commands::Completions { shell } => {
            cmd_completions(*shell);
            Ok(())
        },
        command => {
            let (name, tokens) = command
                .device_request()
                .ok_or_else(|| anyhow::anyhow!("not a device command"))?;
            cmd_device(cli, &mut config, name, tokens)
        },
    }
}

/// Map an error to the process exit code.
///
/// 2 for usage errors (including commands that could not be built),
/// 130 for cancellation, 1 for everything else.
fn exit_code(err: &anyhow::Error) -> u8 {
    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        return match cli_err {
            CliError::Usage(_) => 2,
            CliError::Cancelled(_) => 130,
        };
    }

    match err.downcast_ref::<seedcli::Error>() {
        Some(
            seedcli::Error::UnknownCommand(_)
            | seedcli::Error::InvalidCommandArity { .. }
            | seedcli::Error::UnknownFlag { .. }
            | seedcli::Error::FileNotFound(_),
        ) => 2,
        Some(seedcli::Error::Interrupted) => 130,
        _ => 1,
    }
}

impl Cli {
    /// Apply global options that clap left among the trailing command tokens.
    ///
    /// Once the first positional token of get/set/send is seen, clap hands
    /// everything after it to `tokens`, including `-p`, `-v` and friends.
    fn lift_trailing_globals(&mut self) -> Result<(), CliError> {
        let Some(tokens) = self.command.tokens_mut() else {
            return Ok(());
        };
        let mut iter = std::mem::take(tokens).into_iter();
        let mut rest = Vec::new();

        while let Some(token) = iter.next() {
            let (option, inline) = match token.split_once('=') {
                Some((option, value)) if option.starts_with("--") => {
                    (option, Some(value.to_string()))
                },
                _ => (token.as_str(), None),
            };

            match option {
                "-p" | "--port" | "-b" | "--baud" | "--config" => {
                    let value = match inline {
                        Some(value) => value,
                        None => iter
                            .next()
                            .ok_or_else(|| CliError::Usage(format!("{option} requires a value")))?,
                    };
                    match option {
                        "-p" | "--port" => self.port = Some(value),
                        "-b" | "--baud" => {
                            let baud = value.parse().map_err(|_| {
                                CliError::Usage(format!("invalid baud rate '{value}'"))
                            })?;
                            self.baud = Some(baud);
                        },
                        _ => self.config_path = Some(PathBuf::from(value)),
                    }
                },
                "-q" | "--quiet" if inline.is_none() => self.quiet = true,
                "--non-interactive" if inline.is_none() => self.non_interactive = true,
                "--verbose" if inline.is_none() => self.verbose = self.verbose.saturating_add(1),
                _ if verbose_count(option) > 0 => {
                    self.verbose = self.verbose.saturating_add(verbose_count(option));
                },
                _ => rest.push(token),
            }
        }

        if let Some(tokens) = self.command.tokens_mut() {
            *tokens = rest;
        }
        Ok(())
    }
}

/// Number of `v`s in a short verbosity cluster such as `-vv`, else 0.
fn verbose_count(token: &str) -> u8 {
    match token.strip_prefix('-') {
        Some(vs) if !vs.is_empty() && vs.bytes().all(|b| b == b'v') => {
            u8::try_from(vs.len()).unwrap_or(u8::MAX)
        },
        _ => 0,
    }
}

/// get/set/send: build the command, pick a port, run one exchange.
fn cmd_device(cli: &Cli, config: &mut Config, name: &str, tokens: &[String]) -> Result<()> {
    let protocol = config.protocol_config()?;

    // Nothing touches the port until the command is valid.
    let parsed = Command::parse(name, tokens, &StdFiles, &protocol)?;

    let id = config.hardware_id()?;
    let options = SerialOptions {
        port: cli.port.clone(),
        non_interactive: cli.non_interactive,
    };
    let selected = select_serial_port(&options, config, &id)?;
    if !cli.non_interactive {
        ask_remember_port(&selected, config)?;
    }

    let baud = cli
        .baud
        .or(config.connection.baud)
        .unwrap_or(DEFAULT_BAUD);
    if !cli.quiet {
        eprintln!(
            "{} Using {} at {} baud",
            style("🔌").cyan(),
            selected.name,
            baud
        );
    }

    let mut client = SeedClient::open(&selected.name, baud, protocol)
        .with_context(|| format!("Failed to open {}", selected.name))?;

    let pb = upload_progress_bar(cli, &parsed.command);
    let outcome = client.execute(&parsed.command, &StdFiles, |sent, total| {
        pb.set_length(total as u64);
        pb.set_position(sent as u64);
    });
    let outcome = keep_first_error(outcome, client.close());

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(seedcli::Error::Interrupted) => {
            pb.abandon();
            return Err(CliError::Cancelled("upload interrupted".to_string()).into());
        },
        Err(e) => {
            pb.abandon();
            return Err(e).with_context(|| format!("<{name}> failed"));
        },
    };

    match outcome {
        Outcome::Value(value) => {
            if value.is_empty() {
                if !cli.quiet {
                    eprintln!("{} OK", style("✓").green());
                }
            } else {
                println!("{value}");
            }
        },
        Outcome::Skipped { message } => {
            pb.finish_and_clear();
            if !cli.quiet {
                eprintln!(
                    "{} Device accepted the request without a transfer {}",
                    style("✓").green(),
                    style(message).dim()
                );
            }
        },
        Outcome::Uploaded(report) => {
            pb.finish_with_message("done");
            if !cli.quiet {
                eprintln!(
                    "\n{} Uploaded {} bytes to {} in {} blocks, checksum {} verified",
                    style("🎉").green().bold(),
                    report.bytes,
                    report.storage,
                    report.blocks,
                    report.checksum
                );
            }
        },
    }

    Ok(())
}

/// Combine a command result with the result of closing its port.
///
/// A failed command keeps its own error; a close failure is only logged then.
fn keep_first_error<T>(
    outcome: seedcli::Result<T>,
    closed: seedcli::Result<()>,
) -> seedcli::Result<T> {
    match (outcome, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(close_err)) => Err(close_err),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(close_err)) => {
            log::warn!("Failed to close port: {close_err}");
            Err(e)
        },
    }
}

/// Progress bar for uploads; hidden for other commands and non-TTY output.
fn upload_progress_bar(cli: &Cli, command: &Command) -> ProgressBar {
    if cli.quiet || !use_fancy_output() || !matches!(command, Command::Send { .. }) {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(0);
    #[allow(clippy::unwrap_used)] // Static template string
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb
}

/// List ports command implementation.
fn cmd_list_ports(config: &Config, json: bool) -> Result<()> {
    let id = config.hardware_id()?;
    let detected = seedcli::host::discover_ports(&id);

    if json {
        println!("{}", serde_json::to_string_pretty(&detected)?);
        return Ok(());
    }

    eprintln!("{}", style("Available serial ports").bold().underlined());

    if detected.is_empty() {
        eprintln!("  {}", style("No serial ports found").dim());
        return Ok(());
    }

    for (port, line) in detected.iter().zip(seedcli::format_port_list(&detected)) {
        let bullet = if port.is_seed {
            style("•").green()
        } else {
            style("•").dim()
        };
        eprintln!("  {bullet} {line}");
    }

    if let Some(seed) = seedcli::device::find_seed_port_in(detected) {
        eprintln!(
            "\n{} Device detected on {}",
            style("→").green().bold(),
            style(&seed.name).cyan().bold()
        );
    }

    Ok(())
}

/// Completions command implementation.
fn cmd_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut io::stdout());
}
