//! Defaults and runtime settings for the client and the simulator.

use std::time::Duration;

/// Port the simulator listens on unless told otherwise.
pub const DEFAULT_SIMULATOR_PORT: u16 = 5025;
pub const DEFAULT_SIMULATOR_HOST: &str = "127.0.0.1";

/// Timeouts applied on the client side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientConfig {
    /// Bound on establishing each endpoint's TCP connection.
    pub connect_timeout: Duration,
    /// Bound on each write and each response read.
    pub command_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            command_timeout: Duration::from_secs(5),
        }
    }
}

impl ClientConfig {
    pub fn from_millis(connect_ms: u64, command_ms: u64) -> Self {
        Self {
            connect_timeout: Duration::from_millis(connect_ms),
            command_timeout: Duration::from_millis(command_ms),
        }
    }
}

/// Where the simulator listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatorConfig {
    pub host: String,
    pub port: u16,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_SIMULATOR_HOST.to_string(),
            port: DEFAULT_SIMULATOR_PORT,
        }
    }
}

impl SimulatorConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
