//! Error types shared by the client and simulator halves of the crate.

use crate::registry::Group;
use std::io;

/// Crate-wide Result type for endpoint operations.
pub type Result<T> = std::result::Result<T, EndpointError>;

/// The broad class of an [`EndpointError`], used when presenting outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Connection,
    Timeout,
    Protocol,
    Io,
}

/// Errors raised by a single endpoint while connecting or exchanging a frame.
///
/// Inside a dispatch these never escape the worker that produced them; they
/// are stored as that endpoint's outcome instead.
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    /// Not connected, or the connection attempt failed or was refused.
    #[error("Connection Error: {0}")]
    Connection(String),

    /// No response arrived before the deadline.
    #[error("Timeout Error: {0}")]
    Timeout(String),

    /// Received data could not be read as an ASCII, line-terminated frame.
    #[error("Protocol Error: {0}")]
    Protocol(String),

    /// Any other channel failure.
    #[error("Error: {0}")]
    Io(#[from] io::Error),

    /// The worker driving this endpoint panicked before reporting.
    #[error("Error: worker panicked")]
    WorkerPanicked,
}

impl EndpointError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EndpointError::Connection(_) => ErrorKind::Connection,
            EndpointError::Timeout(_) => ErrorKind::Timeout,
            EndpointError::Protocol(_) => ErrorKind::Protocol,
            EndpointError::Io(_) | EndpointError::WorkerPanicked => ErrorKind::Io,
        }
    }

    /// Classifies a socket error raised while talking to `peer`.
    pub fn from_io(err: io::Error, peer: &str) -> Self {
        use io::ErrorKind as K;
        match err.kind() {
            K::WouldBlock | K::TimedOut => {
                EndpointError::Timeout(format!("Timeout waiting for response from {}", peer))
            }
            K::ConnectionRefused
            | K::ConnectionReset
            | K::ConnectionAborted
            | K::NotConnected
            | K::BrokenPipe
            | K::UnexpectedEof
            | K::AddrNotAvailable => EndpointError::Connection(format!("{}: {}", peer, err)),
            _ => EndpointError::Io(err),
        }
    }
}

/// Errors raised while reading bulk endpoint definitions.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read endpoint records: {0}")]
    Csv(#[from] csv::Error),

    #[error("line {line}: invalid port '{value}'")]
    InvalidPort { line: u64, value: String },

    #[error("line {line}: unknown group '{value}'")]
    UnknownGroup { line: u64, value: String },

    #[error("line {line}: duplicate name '{name}' within its group")]
    DuplicateName { line: u64, name: String },
}

/// Errors raised while adding endpoints to a registry group.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("{group}: identity '{identity}' on port {port} is already used by port {held_by}")]
    DuplicateIdentity {
        group: Group,
        identity: String,
        port: u16,
        held_by: u16,
    },
}

/// Errors raised while persisting a transcript.
#[derive(Debug, thiserror::Error)]
pub enum TranscriptError {
    #[error("no responses to save")]
    Empty,

    #[error("failed to write transcript: {0}")]
    Io(#[from] io::Error),
}

/// Errors raised while building a simulator command table from a file.
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("failed to read command table: {0}")]
    Io(#[from] io::Error),

    #[error("failed to parse command table: {0}")]
    Parse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_are_classified_by_kind() {
        let timeout = EndpointError::from_io(io::Error::from(io::ErrorKind::WouldBlock), "x:1");
        assert_eq!(timeout.kind(), ErrorKind::Timeout);

        let reset = EndpointError::from_io(io::Error::from(io::ErrorKind::ConnectionReset), "x:1");
        assert_eq!(reset.kind(), ErrorKind::Connection);

        let other = EndpointError::from_io(io::Error::from(io::ErrorKind::InvalidInput), "x:1");
        assert_eq!(other.kind(), ErrorKind::Io);
    }

    #[test]
    fn display_carries_operator_labels() {
        let err = EndpointError::Connection("Not connected to 10.0.0.1:5025.".into());
        assert_eq!(err.to_string(), "Connection Error: Not connected to 10.0.0.1:5025.");
        assert_eq!(EndpointError::WorkerPanicked.to_string(), "Error: worker panicked");

        let dup = RegistryError::DuplicateIdentity {
            group: Group::Loads,
            identity: "Bench".into(),
            port: 6000,
            held_by: 5000,
        };
        assert_eq!(
            dup.to_string(),
            "loads: identity 'Bench' on port 6000 is already used by port 5000"
        );
    }
}
