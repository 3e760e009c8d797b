//! Command model.
//!
//! A user request arrives as a command name plus raw tokens. Tokens starting
//! with the flag prefix are flags, everything else is a positional argument,
//! in any order. Each command has a whitelist of flags; a single unknown flag
//! drops the whole flag set and is reported back as a diagnostic.
//!
//! Wire forms:
//!
//! ```text
//! get <name> [<name>...]
//! set <target> <value>
//! send <--sdram|--qspi> <byte_length>
//! data<chunk><pad...>      (binary, see frame)
//! stop<pad...>             (binary, see frame)
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::error::{Error, Result};
use crate::files::FileAccess;
use crate::protocol::config::ProtocolConfig;
use crate::protocol::frame;

/// Read one or more parameters.
pub const CMD_GET: &str = "get";
/// Write one parameter.
pub const CMD_SET: &str = "set";
/// Request an upload.
pub const CMD_SEND: &str = "send";
/// One block of upload data.
pub const CMD_DATA: &str = "data";
/// Upload terminator.
pub const CMD_STOP: &str = "stop";

/// Memory region receiving an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Storage {
    /// External SDRAM buffer.
    #[default]
    Sdram,
    /// External QSPI flash.
    Qspi,
}

impl Storage {
    /// Every storage region.
    pub const ALL: [Self; 2] = [Self::Sdram, Self::Qspi];

    /// Flag selecting this region, also used verbatim on the wire.
    pub fn flag(self) -> &'static str {
        match self {
            Self::Sdram => "--sdram",
            Self::Qspi => "--qspi",
        }
    }

    /// Region for a flag token.
    pub fn from_flag(flag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.flag() == flag)
    }
}

impl fmt::Display for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sdram => "SDRAM",
            Self::Qspi => "QSPI",
        })
    }
}

/// A validated request. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Read named parameters.
    Get {
        /// Parameter names, at least one.
        targets: Vec<String>,
    },
    /// Write one parameter.
    Set {
        /// Parameter name.
        target: String,
        /// New value.
        value: String,
    },
    /// Ask the device to accept an upload.
    Send {
        /// Source file on the host.
        path: PathBuf,
        /// Destination region.
        storage: Storage,
        /// File length at construction time.
        length: u64,
    },
    /// One block of file content (internal to the upload).
    Data {
        /// At most `block_size` bytes.
        payload: Vec<u8>,
    },
    /// Upload terminator (internal to the upload).
    Stop,
}

/// Outcome of parsing user tokens into a [`Command`].
#[derive(Debug)]
pub struct ParsedCommand {
    /// The command.
    pub command: Command,
    /// Set when an unknown flag caused all flags to be dropped.
    pub rejected_flag: Option<Error>,
}

/// Split raw tokens into `(positional args, flags)`, preserving order.
pub fn split_tokens<S: AsRef<str>>(tokens: &[S], flag_prefix: &str) -> (Vec<String>, Vec<String>) {
    tokens
        .iter()
        .map(|t| t.as_ref().to_string())
        .partition(|t| !t.starts_with(flag_prefix))
}

/// Accept `flags` only if every one is in `known`.
pub fn sanitize_flags(command: &'static str, flags: Vec<String>, known: &[&str]) -> Result<Vec<String>> {
    match flags.iter().find(|f| !known.contains(&f.as_str())) {
        Some(flag) => Err(Error::UnknownFlag {
            command,
            flag: flag.clone(),
        }),
        None => Ok(flags),
    }
}

/// Like [`sanitize_flags`], but an unknown flag yields no flags and a diagnostic.
fn accept_flags(command: &'static str, flags: Vec<String>, known: &[&str]) -> (Vec<String>, Option<Error>) {
    match sanitize_flags(command, flags, known) {
        Ok(flags) => (flags, None),
        Err(e) => {
            warn!("{e}");
            (Vec::new(), Some(e))
        },
    }
}

/// Wire form of the upload request.
pub fn send_request(storage: Storage, length: u64) -> String {
    format!("{CMD_SEND} {} {length}", storage.flag())
}

impl Command {
    /// Build a command from its name and raw tokens.
    ///
    /// Fails before anything touches the transport: unknown command name,
    /// wrong arity, or a missing source file.
    pub fn parse<S, F>(name: &str, tokens: &[S], files: &F, config: &ProtocolConfig) -> Result<ParsedCommand>
    where
        S: AsRef<str>,
        F: FileAccess + ?Sized,
    {
        let (args, flags) = split_tokens(tokens, &config.flag_prefix);
        debug!("Parsing <{name}>: args {args:?}, flags {flags:?}");

        let parsed = match name {
            CMD_GET => {
                if args.is_empty() {
                    return Err(Error::InvalidCommandArity {
                        command: CMD_GET,
                        usage: "takes at least one parameter name: seedcli get <name...>",
                        actual: 0,
                    });
                }
                let (_, rejected_flag) = accept_flags(CMD_GET, flags, &[]);
                ParsedCommand {
                    command: Self::Get { targets: args },
                    rejected_flag,
                }
            },
            CMD_SET => {
                let [target, value]: [String; 2] =
                    args.try_into()
                        .map_err(|args: Vec<String>| Error::InvalidCommandArity {
                            command: CMD_SET,
                            usage: "takes exactly two arguments: seedcli set <target> <value>",
                            actual: args.len(),
                        })?;
                let (_, rejected_flag) = accept_flags(CMD_SET, flags, &[]);
                ParsedCommand {
                    command: Self::Set { target, value },
                    rejected_flag,
                }
            },
            CMD_SEND => {
                let [path]: [String; 1] =
                    args.try_into()
                        .map_err(|args: Vec<String>| Error::InvalidCommandArity {
                            command: CMD_SEND,
                            usage: "takes exactly one file: seedcli send <file> [--sdram|--qspi]",
                            actual: args.len(),
                        })?;
                let path = PathBuf::from(path);
                if !files.exists(&path) {
                    return Err(Error::FileNotFound(path));
                }

                let known: Vec<&str> = Storage::ALL.iter().map(|s| s.flag()).collect();
                let (flags, rejected_flag) = accept_flags(CMD_SEND, flags, &known);
                let storage = match flags.as_slice() {
                    [] => Storage::default(),
                    [flag] => Storage::from_flag(flag).unwrap_or_default(),
                    _ => {
                        return Err(Error::InvalidCommandArity {
                            command: CMD_SEND,
                            usage: "accepts at most one storage flag: --sdram or --qspi",
                            actual: flags.len(),
                        });
                    },
                };

                let length = files.size(&path)?;
                ParsedCommand {
                    command: Self::Send {
                        path,
                        storage,
                        length,
                    },
                    rejected_flag,
                }
            },
            other => return Err(Error::UnknownCommand(other.to_string())),
        };

        Ok(parsed)
    }

    /// Build a data block, rejecting payloads larger than one block.
    pub fn data(payload: Vec<u8>, config: &ProtocolConfig) -> Result<Self> {
        if payload.len() > config.block_size {
            return Err(Error::Protocol(format!(
                "data payload of {} bytes exceeds block size {}",
                payload.len(),
                config.block_size
            )));
        }
        Ok(Self::Data { payload })
    }

    /// Command name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Get { .. } => CMD_GET,
            Self::Set { .. } => CMD_SET,
            Self::Send { .. } => CMD_SEND,
            Self::Data { .. } => CMD_DATA,
            Self::Stop => CMD_STOP,
        }
    }

    /// Positional arguments.
    pub fn args(&self) -> Vec<String> {
        match self {
            Self::Get { targets } => targets.clone(),
            Self::Set { target, value } => vec![target.clone(), value.clone()],
            Self::Send { path, .. } => vec![path.display().to_string()],
            Self::Data { .. } | Self::Stop => Vec::new(),
        }
    }

    /// Accepted flags.
    pub fn flags(&self) -> Vec<&'static str> {
        match self {
            Self::Send { storage, .. } => vec![storage.flag()],
            _ => Vec::new(),
        }
    }

    /// Source file of a send command.
    pub fn source_file(&self) -> Option<&Path> {
        match self {
            Self::Send { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Wire form sent to the device.
    pub fn encode(&self, config: &ProtocolConfig) -> Result<Vec<u8>> {
        match self {
            Self::Get { targets } => Ok(format!("{CMD_GET} {}", targets.join(" ")).into_bytes()),
            Self::Set { target, value } => Ok(format!("{CMD_SET} {target} {value}").into_bytes()),
            Self::Send {
                storage, length, ..
            } => Ok(send_request(*storage, *length).into_bytes()),
            Self::Data { payload } => frame::encode_data(config, payload),
            Self::Stop => Ok(frame::encode_stop(config)),
        }
    }
}
