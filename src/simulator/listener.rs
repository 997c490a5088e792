//! Accept loop that hands every connection its own [`Session`].

use super::session::Session;
use super::table::CommandTable;
use log::{error, info, warn};
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Pause after the first failed accept; doubles on each consecutive failure.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(10);
const MAX_ACCEPT_BACKOFF: Duration = Duration::from_secs(1);

/// A bound simulator socket together with the table it answers from.
pub struct SimulatorListener {
    listener: TcpListener,
    table: Arc<CommandTable>,
}

impl SimulatorListener {
    /// Binds the listening socket. Failing here is the one fatal simulator error.
    pub fn bind(addr: impl ToSocketAddrs, table: CommandTable) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        info!(
            "simulator listening on {} ({} command(s))",
            listener.local_addr()?,
            table.len()
        );
        Ok(Self {
            listener,
            table: Arc::new(table),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections forever on the calling thread.
    pub fn serve(self) {
        self.serve_until(&AtomicBool::new(false));
    }

    /// Runs the accept loop on a background thread.
    pub fn spawn(self) -> io::Result<SimulatorHandle> {
        let addr = self.local_addr()?;
        let stop = Arc::new(AtomicBool::new(false));
        let thread = {
            let stop = stop.clone();
            thread::Builder::new()
                .name(String::from("simulator-accept"))
                .spawn(move || self.serve_until(&stop))?
        };
        Ok(SimulatorHandle {
            addr,
            stop,
            thread: Some(thread),
        })
    }

    fn serve_until(self, stop: &AtomicBool) {
        let mut failures: u32 = 0;
        for incoming in self.listener.incoming() {
            if stop.load(Ordering::SeqCst) {
                break;
            }
            match incoming {
                Ok(stream) => {
                    failures = 0;
                    start_session(stream, self.table.clone());
                }
                // Errors such as EMFILE persist until a session ends.
                Err(e) => {
                    failures = failures.saturating_add(1);
                    let pause = accept_backoff(failures);
                    error!("accept failed: {} (retrying in {:?})", e, pause);
                    thread::sleep(pause);
                }
            }
        }
        info!("simulator stopped accepting");
    }
}

/// Delay before accepting again after `failures` consecutive accept errors.
fn accept_backoff(failures: u32) -> Duration {
    if failures == 0 {
        return Duration::ZERO;
    }
    ACCEPT_BACKOFF
        .checked_mul(1 << (failures - 1).min(16))
        .map_or(MAX_ACCEPT_BACKOFF, |pause| pause.min(MAX_ACCEPT_BACKOFF))
}

/// Starts a detached session thread; the accept loop never waits on it.
fn start_session(stream: TcpStream, table: Arc<CommandTable>) {
    let name = match stream.peer_addr() {
        Ok(addr) => format!("session-{}", addr),
        Err(_) => String::from("session"),
    };
    let spawned = thread::Builder::new().name(name).spawn(move || {
        match Session::from_tcp(stream, table) {
            Ok(session) => {
                session.run();
            }
            Err(e) => warn!("could not start session: {}", e),
        }
    });
    if let Err(e) = spawned {
        error!("could not spawn session thread: {}", e);
    }
}

/// Control handle for a simulator running on a background thread.
///
/// Shutting down closes the listening socket. Sessions already running keep
/// answering until their clients disconnect.
pub struct SimulatorHandle {
    addr: SocketAddr,
    stop: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl SimulatorHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Stops accepting and waits for the accept loop to exit.
    pub fn shutdown(mut self) {
        self.stop_accepting();
    }

    fn stop_accepting(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        self.stop.store(true, Ordering::SeqCst);
        // Wake the blocked accept so it observes the flag.
        let mut wake = self.addr;
        if wake.ip().is_unspecified() {
            wake.set_ip(match wake.ip() {
                IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
                IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::LOCALHOST),
            });
        }
        if let Err(e) = TcpStream::connect(wake) {
            warn!("could not wake simulator accept loop: {}", e);
            return;
        }
        if thread.join().is_err() {
            error!("simulator accept loop panicked");
        }
    }
}

impl Drop for SimulatorHandle {
    fn drop(&mut self) {
        self.stop_accepting();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write};

    #[test]
    fn shutdown_closes_listening_socket() {
        let handle = SimulatorListener::bind("127.0.0.1:0", CommandTable::instrument())
            .unwrap()
            .spawn()
            .unwrap();
        let addr = handle.local_addr();

        let mut stream = TcpStream::connect(addr).unwrap();
        stream.write_all(b"POW?\n").unwrap();
        let mut line = String::new();
        BufReader::new(stream.try_clone().unwrap()).read_line(&mut line).unwrap();
        assert_eq!(line, "28\n");

        handle.shutdown();
        assert!(TcpStream::connect(addr).is_err());

        // The live session outlives the listener.
        stream.write_all(b"CURR?\n").unwrap();
        line.clear();
        BufReader::new(stream).read_line(&mut line).unwrap();
        assert_eq!(line, "12\n");
    }

    #[test]
    fn repeated_accept_failures_back_off_up_to_a_cap() {
        assert_eq!(accept_backoff(0), Duration::ZERO);
        assert_eq!(accept_backoff(1), ACCEPT_BACKOFF);
        assert_eq!(accept_backoff(2), ACCEPT_BACKOFF * 2);
        assert_eq!(accept_backoff(4), ACCEPT_BACKOFF * 8);

        let mut previous = Duration::ZERO;
        for failures in 1..100 {
            let pause = accept_backoff(failures);
            assert!(pause >= previous);
            assert!(pause <= MAX_ACCEPT_BACKOFF);
            previous = pause;
        }
        assert_eq!(previous, MAX_ACCEPT_BACKOFF);
    }
}
