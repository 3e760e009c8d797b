//! Upload state machine.
//!
//! ```text
//! Idle -> AwaitingInitialAck -+-> Completed            (device answered OK: nothing to do)
//!                             +-> Aborted              (device answered ERROR)
//!                             +-> SendBlock(0)
//!
//! SendBlock(i) -> AwaitingBlockAck(i) -+-> SendBlock(i + 1)
//!                                      +-> AwaitingFinish   (after the last block)
//!                                      +-> Failed           (anything but a bare OK)
//!
//! AwaitingFinish -+-> Completed         (FINISHED, checksums match)
//!                 +-> ChecksumMismatch  (FINISHED, checksums differ)
//!                 +-> Failed            (anything else)
//! ```
//!
//! Every exchange is one synchronous round trip. There are no retries and no
//! resume: a failed upload restarts from block zero on the next run.

use std::thread;

use log::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::port::Port;
use crate::protocol::command::{Command, Storage, send_request};
use crate::protocol::config::ProtocolConfig;
use crate::protocol::crc::Crc16;
use crate::protocol::frame;
use crate::protocol::response::{Response, Status};

/// State of one upload session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    /// Nothing sent yet.
    Idle,
    /// Send request written, waiting for the device's answer.
    AwaitingInitialAck,
    /// Writing block `i` (0-based).
    SendBlock(usize),
    /// Waiting for the acknowledgement of block `i` (0-based).
    AwaitingBlockAck(usize),
    /// Terminator written, waiting for FINISHED.
    AwaitingFinish,
    /// Upload verified, or nothing to upload.
    Completed,
    /// Device finished but reported a different checksum.
    ChecksumMismatch,
    /// Unexpected response mid-transfer or at termination.
    Failed,
    /// Refused by the device or stopped by the host before completion.
    Aborted,
}

impl TransferState {
    /// Whether the session has ended.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::ChecksumMismatch | Self::Failed | Self::Aborted
        )
    }
}

/// Bookkeeping for one upload, alive from the send request to a terminal state.
#[derive(Debug, Clone)]
pub struct TransferSession {
    total_len: usize,
    block_count: usize,
    block_size: usize,
    blocks_sent: usize,
    crc: Crc16,
    state: TransferState,
}

impl TransferSession {
    /// New idle session for `total_len` payload bytes.
    pub fn new(config: &ProtocolConfig, total_len: usize) -> Self {
        Self {
            total_len,
            block_count: frame::block_count(config, total_len),
            block_size: config.block_size,
            blocks_sent: 0,
            crc: Crc16::new(config.crc_polynomial, config.crc_initial),
            state: TransferState::Idle,
        }
    }

    /// Current state.
    pub fn state(&self) -> TransferState {
        self.state
    }

    /// Payload length.
    pub fn total_len(&self) -> usize {
        self.total_len
    }

    /// Number of blocks the payload splits into.
    pub fn block_count(&self) -> usize {
        self.block_count
    }

    /// Blocks written so far.
    pub fn blocks_sent(&self) -> usize {
        self.blocks_sent
    }

    /// Payload bytes written so far.
    pub fn bytes_sent(&self) -> usize {
        (self.blocks_sent * self.block_size).min(self.total_len)
    }

    /// Checksum over every chunk written so far.
    pub fn checksum(&self) -> u16 {
        self.crc.value()
    }

    fn transition(&mut self, next: TransferState) {
        trace!("Transfer: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn record_block(&mut self, chunk: &[u8]) {
        self.crc.update(chunk);
        self.blocks_sent += 1;
    }
}

/// Result of a successful upload request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The device answered OK to the request and wanted no data.
    Skipped {
        /// Device message.
        message: String,
    },
    /// All blocks acknowledged and the device checksum matched.
    Completed(TransferReport),
}

/// Summary of a verified upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    /// Destination region.
    pub storage: Storage,
    /// Payload bytes sent.
    pub bytes: usize,
    /// Frames sent, excluding the terminator.
    pub blocks: usize,
    /// Checksum agreed by host and device.
    pub checksum: u16,
    /// Text of the device's FINISHED line.
    pub message: String,
}

/// Write `request`, wait the settle delay, read and classify one line.
///
/// A blank line (the stray `\r` of the firmware's `\n\r` ending) is skipped
/// once.
pub fn transceive<P: Port + ?Sized>(
    port: &mut P,
    config: &ProtocolConfig,
    request: &[u8],
) -> Result<Response> {
    port.write_all_bytes(request)?;
    if !config.settle_delay.is_zero() {
        thread::sleep(config.settle_delay);
    }

    let mut response = Response::classify(&port.read_line(config.max_line_len)?, config);
    if response.line.trim().is_empty() {
        response = Response::classify(&port.read_line(config.max_line_len)?, config);
    }

    debug!("Device: {:?} ({})", response.line, response.status);
    Ok(response)
}

/// Upload `payload` to `storage`, stopping when the embedding application
/// requests an interruption.
pub fn upload<P, F>(
    port: &mut P,
    config: &ProtocolConfig,
    storage: Storage,
    payload: &[u8],
    progress: F,
) -> Result<UploadOutcome>
where
    P: Port + ?Sized,
    F: FnMut(usize, usize),
{
    upload_with(
        port,
        config,
        storage,
        payload,
        progress,
        crate::is_interrupted_requested,
    )
}

/// Upload `payload` to `storage`.
///
/// `progress(bytes_sent, total)` runs after each acknowledged block.
/// `should_stop` is polled before each block.
pub fn upload_with<P, F, S>(
    port: &mut P,
    config: &ProtocolConfig,
    storage: Storage,
    payload: &[u8],
    mut progress: F,
    should_stop: S,
) -> Result<UploadOutcome>
where
    P: Port + ?Sized,
    F: FnMut(usize, usize),
    S: Fn() -> bool,
{
    let mut session = TransferSession::new(config, payload.len());
    let result = upload_session(
        &mut session,
        port,
        config,
        storage,
        payload,
        &mut progress,
        should_stop,
    );

    if let Err(e) = &result {
        warn!(
            "Upload to {storage} ended in state {:?} after {}/{} blocks: {e}",
            session.state(),
            session.blocks_sent(),
            session.block_count()
        );
    }
    result
}

/// Run an upload on a caller-owned session.
///
/// The session keeps the state the upload ended in, including after an
/// error. `payload` must be as long as the session was created for.
pub fn upload_session<P, F, S>(
    session: &mut TransferSession,
    port: &mut P,
    config: &ProtocolConfig,
    storage: Storage,
    payload: &[u8],
    progress: &mut F,
    should_stop: S,
) -> Result<UploadOutcome>
where
    P: Port + ?Sized,
    F: FnMut(usize, usize),
    S: Fn() -> bool,
{
    config.validate()?;
    if payload.len() != session.total_len() {
        return Err(Error::Protocol(format!(
            "session expects {} bytes, payload has {}",
            session.total_len(),
            payload.len()
        )));
    }

    let total = session.total_len();
    let blocks = session.block_count();

    info!("Requesting upload of {total} bytes ({blocks} blocks) to {storage}");
    session.transition(TransferState::AwaitingInitialAck);
    let request = send_request(storage, total as u64);
    let response = transceive(port, config, request.as_bytes())?;

    match response.status {
        Status::Ok => {
            info!("Device accepted without transfer: {}", response.line);
            session.transition(TransferState::Completed);
            return Ok(UploadOutcome::Skipped {
                message: response.text,
            });
        },
        Status::Error => {
            session.transition(TransferState::Aborted);
            return Err(Error::Device(device_text(&response)));
        },
        Status::Finished | Status::Unrecognized => {
            debug!("Device ready to receive: {}", response.line);
        },
    }

    for (index, chunk) in payload.chunks(config.block_size).enumerate() {
        if should_stop() {
            session.transition(TransferState::Aborted);
            debug!(
                "Interrupted before block {}/{blocks} (checksum so far {})",
                index + 1,
                session.checksum()
            );
            return Err(Error::Interrupted);
        }

        session.transition(TransferState::SendBlock(index));
        let frame = Command::data(chunk.to_vec(), config)?.encode(config)?;
        trace!(
            "Block {}/{blocks}: {} payload bytes, {} frame bytes",
            index + 1,
            chunk.len(),
            frame.len()
        );

        let response = transceive(port, config, &frame);
        session.record_block(chunk);
        session.transition(TransferState::AwaitingBlockAck(index));

        let response = response.map_err(|e| {
            session.transition(TransferState::Failed);
            match e {
                Error::Timeout(msg) => Error::Timeout(format!(
                    "waiting for acknowledgement of block {}/{blocks}: {msg}",
                    index + 1
                )),
                other => other,
            }
        })?;

        if !response.is_exact(Status::Ok) {
            session.transition(TransferState::Failed);
            return Err(Error::EarlyBlockFailure {
                block: index + 1,
                total: blocks,
                response: response.line,
                checksum: session.checksum(),
            });
        }

        progress(session.bytes_sent(), total);
    }

    session.transition(TransferState::AwaitingFinish);
    let response = transceive(port, config, &Command::Stop.encode(config)?)?;

    if response.status != Status::Finished {
        session.transition(TransferState::Failed);
        return Err(Error::ImproperTermination(response.line));
    }

    let host = session.checksum();
    let device = response.trailing_number().unwrap_or_default().to_string();
    if device.parse::<u32>().ok() != Some(u32::from(host)) {
        session.transition(TransferState::ChecksumMismatch);
        return Err(Error::ChecksumMismatch { host, device });
    }

    session.transition(TransferState::Completed);
    info!("Upload verified: {total} bytes, checksum {host}");

    Ok(UploadOutcome::Completed(TransferReport {
        storage,
        bytes: total,
        blocks: session.blocks_sent(),
        checksum: host,
        message: response.text,
    }))
}

/// Error text of a response, falling back to the whole line.
pub(crate) fn device_text(response: &Response) -> String {
    if response.text.is_empty() {
        response.line.clone()
    } else {
        response.text.clone()
    }
}
