//! # SCPI Multiport Library
//!
//! This library sends one SCPI command to a whole group of TCP-connected
//! instruments at once and collects every instrument's answer, without one
//! slow or broken instrument holding up the rest. It also contains a small
//! simulator that answers the same line protocol from a fixed table, for
//! use when no real hardware is at hand.
//!
//! ```no_run
//! use scpi_mp::{commands, Dispatcher, EndpointRegistry, Group};
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), scpi_mp::RegistryError> {
//! let mut registry = EndpointRegistry::new();
//! registry.add_ports(Group::Loads, "10.3.200.10", &[5000, 5001])?;
//! registry.connect_all(Group::Loads, Duration::from_secs(5));
//!
//! let result = Dispatcher::default().dispatch(registry.group_mut(Group::Loads), &commands::identify());
//! for line in result.render() {
//!     println!("{}", line);
//! }
//! registry.disconnect_all();
//! # Ok(())
//! # }
//! ```

pub mod commands;
pub mod config;
pub mod dispatch;
pub mod endpoint;
pub mod error;
pub mod loader;
pub mod protocol;
pub mod registry;
pub mod simulator;
pub mod transcript;

// Re-exports
pub use self::config::{ClientConfig, SimulatorConfig};
pub use self::dispatch::{DispatchEntry, DispatchResult, Dispatcher};
pub use self::endpoint::{ConnectionState, Endpoint};
pub use self::error::{
    EndpointError, ErrorKind, LoadError, RegistryError, Result, TableError, TranscriptError,
};
pub use self::loader::EndpointRecord;
pub use self::protocol::{Command, Response};
pub use self::registry::{EndpointGroup, EndpointRegistry, Group};
pub use self::transcript::Transcript;
