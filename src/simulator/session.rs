//! Per-connection read-line / look-up / write-line loop.

use super::table::CommandTable;
use crate::protocol::{encode_frame, fill_line, Fill};
use log::{debug, info, warn};
use std::io::{self, BufReader, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingLine,
    Responding,
    Closed,
}

/// Answers one client until it disconnects.
///
/// Malformed input never ends a session: undecodable or oversized lines are
/// answered with the table's fallback. Only end-of-stream or a failed write
/// moves it to [`SessionState::Closed`].
pub struct Session<R, W> {
    reader: BufReader<R>,
    writer: W,
    table: Arc<CommandTable>,
    peer: String,
    state: SessionState,
    line: Vec<u8>,
    pending: String,
    answered: u64,
}

impl Session<TcpStream, TcpStream> {
    /// Wraps an accepted connection.
    pub fn from_tcp(stream: TcpStream, table: Arc<CommandTable>) -> io::Result<Self> {
        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| String::from("unknown peer"));
        let writer = stream.try_clone()?;
        Ok(Self::new(stream, writer, table, peer))
    }
}

impl<R: Read, W: Write> Session<R, W> {
    pub fn new(reader: R, writer: W, table: Arc<CommandTable>, peer: impl Into<String>) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer,
            table,
            peer: peer.into(),
            state: SessionState::AwaitingLine,
            line: Vec::new(),
            pending: String::new(),
            answered: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Number of responses written so far.
    pub fn answered(&self) -> u64 {
        self.answered
    }

    /// Drives the session until the peer goes away. Returns the responses sent.
    pub fn run(mut self) -> u64 {
        info!("{}: session opened", self.peer);
        while self.step() != SessionState::Closed {}
        info!("{}: session closed after {} response(s)", self.peer, self.answered);
        self.answered
    }

    /// Performs one state transition and returns the new state.
    pub fn step(&mut self) -> SessionState {
        self.state = match self.state {
            SessionState::AwaitingLine => match self.read_command() {
                Some(response) => {
                    self.pending = response;
                    SessionState::Responding
                }
                None => SessionState::Closed,
            },
            SessionState::Responding => match self.write_response() {
                Ok(()) => {
                    self.answered += 1;
                    SessionState::AwaitingLine
                }
                Err(e) => {
                    warn!("{}: write failed: {}", self.peer, e);
                    SessionState::Closed
                }
            },
            SessionState::Closed => SessionState::Closed,
        };
        self.state
    }

    /// Reads the next line and returns its answer, or `None` once the peer is gone.
    fn read_command(&mut self) -> Option<String> {
        self.line.clear();
        let mut oversized = false;
        loop {
            match fill_line(&mut self.reader, &mut self.line) {
                Ok(Fill::Line) => break,
                Ok(Fill::Pending) => continue,
                Ok(Fill::Overflow) => {
                    // Keep consuming up to the terminator, then answer the fallback.
                    oversized = true;
                    self.line.clear();
                }
                Ok(Fill::Eof) => return None,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!("{}: read failed: {}", self.peer, e);
                    return None;
                }
            }
        }

        if oversized {
            warn!("{}: discarded oversized line", self.peer);
            return Some(self.table.fallback().to_string());
        }

        let text = String::from_utf8_lossy(&self.line);
        let command = text.trim();
        debug!("{}: received {:?}", self.peer, command);
        Some(self.table.lookup(command).to_string())
    }

    fn write_response(&mut self) -> io::Result<()> {
        debug!("{}: responding {:?}", self.peer, self.pending);
        self.writer.write_all(&encode_frame(&self.pending))?;
        self.writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MAX_LINE_LEN;
    use crate::simulator::table::{INSTRUMENT_IDENTITY, UNKNOWN_COMMAND};
    use std::io::Cursor;

    fn run_script(input: &[u8]) -> (u64, String) {
        let mut output = Vec::new();
        let session = Session::new(
            Cursor::new(input.to_vec()),
            &mut output,
            Arc::new(CommandTable::instrument()),
            "test",
        );
        let answered = session.run();
        (answered, String::from_utf8(output).unwrap())
    }

    #[test]
    fn answers_each_line_in_order() {
        let (answered, output) = run_script(b"*IDN?\nMEAS:VOLT?\nBOGUS\n");
        assert_eq!(answered, 3);
        assert_eq!(
            output,
            format!("{}\n3.3\n{}\n", INSTRUMENT_IDENTITY, UNKNOWN_COMMAND)
        );
    }

    #[test]
    fn strips_surrounding_whitespace_and_carriage_returns() {
        let (_, output) = run_script(b"  VOLT? \r\n");
        assert_eq!(output, "14\n");
    }

    #[test]
    fn partial_line_at_eof_is_not_answered() {
        let (answered, output) = run_script(b"CURR?\nPOW");
        assert_eq!(answered, 1);
        assert_eq!(output, "12\n");
    }

    #[test]
    fn survives_malformed_input() {
        let mut input = vec![0xFF, 0xFE, b'\n'];
        input.extend(std::iter::repeat(b'A').take(MAX_LINE_LEN * 3));
        input.extend_from_slice(b"\n\nPOW?\n");

        let (answered, output) = run_script(&input);
        assert_eq!(answered, 4);
        assert_eq!(
            output,
            format!("{0}\n{0}\n{0}\n28\n", UNKNOWN_COMMAND)
        );
    }

    #[test]
    fn stateless_across_commands() {
        let (_, output) = run_script(b"OUTP ON\nVOLT?\nOUTP OFF\nVOLT?\n");
        assert_eq!(output, format!("{0}\n14\n{0}\n14\n", UNKNOWN_COMMAND));
    }

    struct BrokenWriter;

    impl Write for BrokenWriter {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_failure_closes_the_session() {
        let mut session = Session::new(
            Cursor::new(b"*IDN?\n*IDN?\n".to_vec()),
            BrokenWriter,
            Arc::new(CommandTable::instrument()),
            "test",
        );
        assert_eq!(session.state(), SessionState::AwaitingLine);
        assert_eq!(session.step(), SessionState::Responding);
        assert_eq!(session.step(), SessionState::Closed);
        assert_eq!(session.step(), SessionState::Closed);
        assert_eq!(session.answered(), 0);
    }
}
