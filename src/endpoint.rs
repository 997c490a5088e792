//! A single TCP-connected instrument.

use crate::error::{EndpointError, Result};
use crate::protocol::{decode_response, encode_frame, fill_line, Command, Fill, Response, MAX_LINE_LEN};
use log::{debug, info, warn};
use std::fmt;
use std::io::{self, BufReader, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

/// Smallest timeout handed to the socket; a zero timeout is rejected by the OS.
const MIN_SOCKET_TIMEOUT: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => f.write_str("disconnected"),
            ConnectionState::Connected => f.write_str("connected"),
        }
    }
}

/// What one request/response exchange ended with.
enum Exchange {
    Sent,
    Line(String),
    /// The peer closed after sending an unterminated line.
    Closed(String),
}

/// One remote instrument addressed by host and port.
///
/// The endpoint exclusively owns its socket. The connection is either fully
/// usable or absent, so the state is derived from it rather than stored.
/// Calls on the same endpoint must be serialized by the caller; `&mut self`
/// on every I/O method enforces that within safe code.
#[derive(Debug)]
pub struct Endpoint {
    identity: String,
    host: String,
    port: u16,
    connection: Option<BufReader<TcpStream>>,
}

impl Endpoint {
    /// Creates a disconnected endpoint.
    pub fn new(identity: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            identity: identity.into(),
            host: host.into(),
            port,
            connection: None,
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> ConnectionState {
        if self.connection.is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// The resolved remote address of the live connection, if any.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.connection
            .as_ref()
            .and_then(|reader| reader.get_ref().peer_addr().ok())
    }

    fn target(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Opens the TCP connection, trying every address the host resolves to.
    ///
    /// Fails with [`EndpointError::Connection`] if the endpoint is already
    /// connected, or if no address accepted within `timeout`.
    pub fn connect(&mut self, timeout: Duration) -> Result<()> {
        let target = self.target();
        if self.connection.is_some() {
            return Err(EndpointError::Connection(format!(
                "already connected to {}",
                target
            )));
        }

        let addrs = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| {
                EndpointError::Connection(format!("Connection to {} failed: {}", target, e))
            })?;

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, timeout.max(MIN_SOCKET_TIMEOUT)) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    info!("{}: connected to {} ({})", self.identity, target, addr);
                    self.connection = Some(BufReader::new(stream));
                    return Ok(());
                }
                Err(e) => {
                    debug!("{}: connect to {} failed: {}", self.identity, addr, e);
                    last_error = Some(e);
                }
            }
        }

        let reason = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| String::from("host resolved to no addresses"));
        Err(EndpointError::Connection(format!(
            "Connection to {} failed: {}",
            target, reason
        )))
    }

    /// Closes the socket if one is open. Calling it again is a no-op.
    pub fn disconnect(&mut self) {
        if let Some(reader) = self.connection.take() {
            // The peer may already be gone; the socket is closed on drop either way.
            let _ = reader.get_ref().shutdown(Shutdown::Both);
            info!("{}: disconnected from {}", self.identity, self.target());
        }
    }

    /// Writes `command` as one frame and, for queries, waits for the reply.
    ///
    /// The write and the read are both bounded by `timeout`. The read deadline
    /// is absolute, so a peer trickling bytes cannot stretch it. Any error
    /// drops the connection. After a timeout the reply may still be in flight,
    /// and keeping the stream would hand it to the next query.
    pub fn send_command(
        &mut self,
        command: &Command,
        expect_response: bool,
        timeout: Duration,
    ) -> Result<Response> {
        let target = self.target();
        let Some(reader) = self.connection.as_mut() else {
            return Err(EndpointError::Connection(format!(
                "Not connected to {}.",
                target
            )));
        };

        debug!("{} -> {}: {}", self.identity, target, command);
        match exchange(reader, command, expect_response, timeout, &target) {
            Ok(Exchange::Sent) => Ok(Response::NoResponseExpected),
            Ok(Exchange::Line(text)) => {
                debug!("{} <- {}: {}", self.identity, target, text);
                Ok(Response::Text(text))
            }
            Ok(Exchange::Closed(text)) => {
                debug!("{} <- {}: {} (peer closed)", self.identity, target, text);
                self.connection = None;
                Ok(Response::Text(text))
            }
            Err(err) => {
                warn!("{}: {} failed: {}", self.identity, command, err);
                self.connection = None;
                Err(err)
            }
        }
    }
}

fn exchange(
    reader: &mut BufReader<TcpStream>,
    command: &Command,
    expect_response: bool,
    timeout: Duration,
    target: &str,
) -> Result<Exchange> {
    let timeout = timeout.max(MIN_SOCKET_TIMEOUT);
    let stream = reader.get_mut();
    stream.set_write_timeout(Some(timeout))?;
    // A half-written frame desynchronizes the stream, so a write timeout is fatal.
    let write_failed = |e: io::Error| match EndpointError::from_io(e, target) {
        EndpointError::Timeout(_) => {
            EndpointError::Connection(format!("{}: write timed out", target))
        }
        other => other,
    };
    stream.write_all(&encode_frame(command.as_str())).map_err(write_failed)?;
    stream.flush().map_err(write_failed)?;

    if !expect_response {
        return Ok(Exchange::Sent);
    }

    let deadline = Instant::now() + timeout;
    let mut line = Vec::new();
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(EndpointError::Timeout(format!(
                "Timeout waiting for response from {}",
                target
            )));
        }
        reader.get_ref().set_read_timeout(Some(remaining.max(MIN_SOCKET_TIMEOUT)))?;

        match fill_line(reader, &mut line) {
            Ok(Fill::Line) => return decode_response(&line).map(Exchange::Line),
            Ok(Fill::Pending) => continue,
            Ok(Fill::Eof) if line.is_empty() => {
                return Err(EndpointError::Connection(format!(
                    "{}: connection closed by peer",
                    target
                )))
            }
            Ok(Fill::Eof) => return decode_response(&line).map(Exchange::Closed),
            Ok(Fill::Overflow) => {
                return Err(EndpointError::Protocol(format!(
                    "response from {} exceeds {} bytes without a terminator",
                    target, MAX_LINE_LEN
                )))
            }
            // Re-check the deadline rather than trusting the OS timer granularity.
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                ) =>
            {
                continue
            }
            Err(e) => return Err(EndpointError::from_io(e, target)),
        }
    }
}
