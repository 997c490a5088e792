//! Commonly used SCPI commands.
//!
//! Queries end in `?`; everything else is fire-and-forget.

use crate::error::Result;
use crate::protocol::Command;
use std::fmt::Display;

/// The operator's selectable command list.
pub const PRESETS: &[&str] = &[
    "*IDN?",
    "*RST",
    "SYST:REM",
    "SYST:LOC",
    "SYST:VERS?",
    "SYST:ERR?",
    "OUTP ON",
    "OUTP OFF",
    "VOLT?",
    "CURR?",
    ":CHANnel 1",
    ":CHANnel 2",
    ":SOURce:INPut:STATe 1",
    ":SOURce:INPut:STATe 0",
    "STAT:CHAN:ENAB 1",
    ":FUNCtion CURR",
    ":FUNCtion RES",
    "CURR 5",
    "RES 5",
];

fn fixed(text: &'static str) -> Command {
    // Every literal below is a valid single-line ASCII command.
    match Command::new(text) {
        Ok(command) => command,
        Err(e) => unreachable!("invalid built-in command {:?}: {}", text, e),
    }
}

pub fn identify() -> Command {
    fixed("*IDN?")
}

pub fn reset() -> Command {
    fixed("*RST")
}

pub fn system_remote() -> Command {
    fixed("SYST:REM")
}

pub fn system_local() -> Command {
    fixed("SYST:LOC")
}

pub fn system_version() -> Command {
    fixed("SYST:VERS?")
}

pub fn system_error() -> Command {
    fixed("SYST:ERR?")
}

pub fn output_on() -> Command {
    fixed("OUTP ON")
}

pub fn output_off() -> Command {
    fixed("OUTP OFF")
}

pub fn get_voltage() -> Command {
    fixed("VOLT?")
}

pub fn get_current() -> Command {
    fixed("CURR?")
}

/// `VOLT {value}`. Fails if `value` renders with a line break or non-ASCII text.
pub fn set_voltage(value: impl Display) -> Result<Command> {
    Command::new(format!("VOLT {}", value))
}

/// `CURR {value}`.
pub fn set_current(value: impl Display) -> Result<Command> {
    Command::new(format!("CURR {}", value))
}

/// The presets as validated commands.
pub fn presets() -> Vec<Command> {
    PRESETS.iter().copied().map(fixed).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setters_are_fire_and_forget() {
        let cmd = set_voltage(5.5).unwrap();
        assert_eq!(cmd.as_str(), "VOLT 5.5");
        assert!(!cmd.is_query());
        assert_eq!(set_current("2").unwrap().as_str(), "CURR 2");
        assert!(set_voltage("1\nOUTP ON").is_err());
    }

    #[test]
    fn presets_are_valid() {
        let presets = presets();
        assert_eq!(presets.len(), PRESETS.len());
        assert_eq!(presets.iter().filter(|c| c.is_query()).count(), 5);
        assert!(identify().is_query());
        assert!(!reset().is_query());
    }
}
