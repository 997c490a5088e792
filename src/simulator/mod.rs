//! A stand-in instrument that answers the line protocol from a fixed table.
//!
//! Each accepted connection gets an independent [`Session`]; the only thing
//! sessions share is the read-only [`CommandTable`].

pub mod listener;
pub mod session;
pub mod table;

pub use listener::{SimulatorHandle, SimulatorListener};
pub use session::{Session, SessionState};
pub use table::{CommandTable, Profile, INSTRUMENT_IDENTITY, LOAD_IDENTITY, UNKNOWN_COMMAND};
