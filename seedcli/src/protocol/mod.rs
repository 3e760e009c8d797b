//! Protocol implementations.

pub mod command;
pub mod config;
pub mod crc;
pub mod frame;
pub mod response;
pub mod transfer;

// Re-export common types
pub use command::{Command, ParsedCommand, Storage};
pub use config::ProtocolConfig;
pub use crc::{Crc16, crc16_reflected};
pub use response::{Response, Status};
pub use transfer::{
    TransferReport, TransferSession, TransferState, UploadOutcome, transceive, upload,
    upload_session,
};
