//! Classification of device response lines.
//!
//! The firmware answers every request with one line of the form
//! `[SEED]: <STATUS>[: <text>]`, terminated by `\n\r`. Since the host reads
//! up to `\n`, the `\r` of the previous line can show up at the start of
//! the next one; both ends are trimmed before classification.

use std::fmt;

use crate::protocol::config::ProtocolConfig;

/// Status carried by a response line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Request accepted.
    Ok,
    /// Request rejected.
    Error,
    /// Upload finished; trailing text carries the device checksum.
    Finished,
    /// No known status token.
    Unrecognized,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ok => "OK",
            Self::Error => "ERROR",
            Self::Finished => "FINISHED",
            Self::Unrecognized => "unrecognized",
        })
    }
}

/// One classified line received from the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Classified status.
    pub status: Status,
    /// Text after the status token, or the whole line when unrecognized.
    pub text: String,
    /// The line with line endings stripped.
    pub line: String,
    /// Whether the line started with the protocol prefix.
    pub prefixed: bool,
}

impl Response {
    /// Classify a raw line.
    ///
    /// When the line carries the protocol prefix, the first word after it is
    /// the status token (a trailing `:` is ignored). Without the prefix, the
    /// first word that is a known token wins.
    pub fn classify(raw: &str, config: &ProtocolConfig) -> Self {
        let line = raw.trim_matches(|c| c == '\r' || c == '\n').to_string();

        let (prefixed, body) = match line.strip_prefix(config.response_prefix.as_str()) {
            Some(rest) => (true, rest.trim_start()),
            None => (false, line.as_str()),
        };

        let classified = if prefixed {
            split_status(body).and_then(|(token, rest)| {
                status_of(token, config).map(|status| (status, rest.to_string()))
            })
        } else {
            find_status(body, config)
        };

        let (status, text) =
            classified.unwrap_or_else(|| (Status::Unrecognized, body.trim().to_string()));

        Self {
            status,
            text,
            line,
            prefixed,
        }
    }

    /// Strict check: the line starts with the protocol prefix and `status`.
    pub fn is_strict(&self, status: Status) -> bool {
        self.prefixed && self.status == status
    }

    /// Exact check: a strict `status` line with nothing after the token.
    pub fn is_exact(&self, status: Status) -> bool {
        self.is_strict(status) && self.text.is_empty()
    }

    /// Trailing run of decimal digits, e.g. the checksum in
    /// `Transmission done. CRC: 12345`.
    pub fn trailing_number(&self) -> Option<&str> {
        let text = self.text.trim_end();
        let start = text
            .char_indices()
            .rev()
            .take_while(|(_, c)| c.is_ascii_digit())
            .last()
            .map(|(i, _)| i)?;
        Some(&text[start..])
    }
}

/// Split `TOKEN[:] rest` into the token and the remaining text.
fn split_status(body: &str) -> Option<(&str, &str)> {
    let body = body.trim_start();
    let end = body
        .find(|c: char| c.is_whitespace() || c == ':')
        .unwrap_or(body.len());
    if end == 0 {
        return None;
    }
    let (token, rest) = body.split_at(end);
    let rest = rest.strip_prefix(':').unwrap_or(rest);
    Some((token, rest.trim()))
}

fn status_of(token: &str, config: &ProtocolConfig) -> Option<Status> {
    let is = |tokens: &[String]| tokens.iter().any(|t| t == token);
    if is(&config.ok_tokens) {
        Some(Status::Ok)
    } else if is(&config.error_tokens) {
        Some(Status::Error)
    } else if is(&config.finished_tokens) {
        Some(Status::Finished)
    } else {
        None
    }
}

fn find_status(body: &str, config: &ProtocolConfig) -> Option<(Status, String)> {
    let mut rest = body;
    while let Some((token, after)) = split_status(rest) {
        if let Some(status) = status_of(token, config) {
            return Some((status, after.to_string()));
        }
        rest = after;
    }
    None
}
