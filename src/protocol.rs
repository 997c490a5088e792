//! The ASCII line protocol spoken between clients and instruments.
//!
//! One command or one response per line, terminated by a single line feed.
//! There is no framing beyond the terminator and no escaping, so a command can
//! never carry an embedded terminator.

use crate::error::{EndpointError, Result};
use std::fmt;
use std::io::{self, BufRead};
use std::str::FromStr;

/// The byte that ends every frame in both directions.
pub const LINE_TERMINATOR: u8 = b'\n';

/// Longest line accepted before the peer is considered to be misbehaving.
pub const MAX_LINE_LEN: usize = 4096;

/// Text shown in place of a response for fire-and-forget commands.
pub const NO_RESPONSE_EXPECTED: &str = "No response expected";

/// An immutable, validated command string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Command(String);

impl Command {
    /// Validates `text` as a single-line ASCII command.
    ///
    /// Surrounding whitespace is trimmed. Empty text, embedded `\r`/`\n`
    /// and non-ASCII characters are rejected.
    pub fn new(text: impl AsRef<str>) -> Result<Self> {
        let text = text.as_ref().trim();
        if text.is_empty() {
            return Err(EndpointError::Protocol("empty command".into()));
        }
        if text.contains(|c: char| c == '\n' || c == '\r') {
            return Err(EndpointError::Protocol(format!(
                "command {:?} contains a line terminator",
                text
            )));
        }
        if !text.is_ascii() {
            return Err(EndpointError::Protocol(format!(
                "command {:?} is not ASCII",
                text
            )));
        }
        Ok(Self(text.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Queries end in `?` and always draw a response line.
    pub fn is_query(&self) -> bool {
        self.0.ends_with('?')
    }
}

impl FromStr for Command {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self> {
        Command::new(s)
    }
}

impl AsRef<str> for Command {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a successful `send_command` produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// The trimmed response line.
    Text(String),
    /// The command was fire-and-forget; nothing was read.
    NoResponseExpected,
}

impl Response {
    pub fn text(&self) -> Option<&str> {
        match self {
            Response::Text(text) => Some(text),
            Response::NoResponseExpected => None,
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Text(text) => f.write_str(text),
            Response::NoResponseExpected => f.write_str(NO_RESPONSE_EXPECTED),
        }
    }
}

/// Encodes a payload as one wire frame.
pub fn encode_frame(payload: &str) -> Vec<u8> {
    let mut frame = Vec::with_capacity(payload.len() + 1);
    frame.extend_from_slice(payload.as_bytes());
    frame.push(LINE_TERMINATOR);
    frame
}

/// Outcome of pulling one buffered chunk toward a complete line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fill {
    /// The terminator was consumed; the line is complete.
    Line,
    /// More bytes are needed.
    Pending,
    /// The peer closed the stream.
    Eof,
    /// The line grew past [`MAX_LINE_LEN`] without a terminator.
    Overflow,
}

/// Moves bytes from `reader` into `line` up to and including the terminator.
///
/// Performs at most one read on the underlying stream, so callers can
/// re-arm a deadline between calls. The terminator itself is not stored.
pub fn fill_line<R: BufRead>(reader: &mut R, line: &mut Vec<u8>) -> io::Result<Fill> {
    let available = reader.fill_buf()?;
    if available.is_empty() {
        return Ok(Fill::Eof);
    }

    let (consumed, complete) = match available.iter().position(|&b| b == LINE_TERMINATOR) {
        Some(end) => {
            line.extend_from_slice(&available[..end]);
            (end + 1, true)
        }
        None => {
            line.extend_from_slice(available);
            (available.len(), false)
        }
    };
    reader.consume(consumed);

    if complete {
        Ok(Fill::Line)
    } else if line.len() > MAX_LINE_LEN {
        Ok(Fill::Overflow)
    } else {
        Ok(Fill::Pending)
    }
}

/// Decodes a received response line, stripping trailing whitespace.
pub fn decode_response(line: &[u8]) -> Result<String> {
    if !line.is_ascii() {
        return Err(EndpointError::Protocol("response is not ASCII".into()));
    }
    // ASCII is always valid UTF-8.
    let text = String::from_utf8_lossy(line);
    Ok(text.trim_end().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufReader, Cursor};

    #[test]
    fn command_query_detection() {
        assert!(Command::new("*IDN?").unwrap().is_query());
        assert!(Command::new("MEAS:VOLT?").unwrap().is_query());
        assert!(!Command::new("*RST").unwrap().is_query());
        assert!(!Command::new("OUTP ON").unwrap().is_query());
    }

    #[test]
    fn command_rejects_bad_text() {
        assert!(Command::new("").is_err());
        assert!(Command::new("   ").is_err());
        assert!(Command::new("VOLT 5\nOUTP ON").is_err());
        assert!(Command::new("VOLT\r5").is_err());
        assert!(Command::new("VOLT µ").is_err());
    }

    #[test]
    fn command_is_trimmed() {
        let cmd: Command = "  *IDN?\t".parse().unwrap();
        assert_eq!(cmd.as_str(), "*IDN?");
        assert_eq!(encode_frame(cmd.as_str()), b"*IDN?\n".to_vec());
    }

    #[test]
    fn fill_line_splits_on_terminator() {
        let mut reader = Cursor::new(b"3.3\r\nnext\n".to_vec());
        let mut line = Vec::new();
        assert_eq!(fill_line(&mut reader, &mut line).unwrap(), Fill::Line);
        assert_eq!(decode_response(&line).unwrap(), "3.3");

        line.clear();
        assert_eq!(fill_line(&mut reader, &mut line).unwrap(), Fill::Line);
        assert_eq!(line, b"next");

        line.clear();
        assert_eq!(fill_line(&mut reader, &mut line).unwrap(), Fill::Eof);
    }

    #[test]
    fn fill_line_handles_partial_reads() {
        // A tiny buffer forces the line to arrive over several fills.
        let mut reader = BufReader::with_capacity(2, Cursor::new(b"12345\n".to_vec()));
        let mut line = Vec::new();
        let mut fills = 0;
        while fill_line(&mut reader, &mut line).unwrap() == Fill::Pending {
            fills += 1;
        }
        assert!(fills >= 2);
        assert_eq!(line, b"12345");
    }

    #[test]
    fn fill_line_reports_overflow() {
        let long = vec![b'A'; MAX_LINE_LEN + 10];
        let mut reader = Cursor::new(long);
        let mut line = Vec::new();
        assert_eq!(fill_line(&mut reader, &mut line).unwrap(), Fill::Overflow);
    }

    #[test]
    fn decode_rejects_non_ascii() {
        assert!(matches!(
            decode_response(&[0xC3, 0xA9]),
            Err(EndpointError::Protocol(_))
        ));
    }

    #[test]
    fn response_display() {
        assert_eq!(Response::Text("14".into()).to_string(), "14");
        assert_eq!(Response::NoResponseExpected.to_string(), "No response expected");
    }
}
