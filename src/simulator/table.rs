//! The fixed command-to-response table the simulator answers from.

use crate::error::TableError;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Answer for any command the table does not contain.
pub const UNKNOWN_COMMAND: &str = "ERROR: Unknown command";

pub const INSTRUMENT_IDENTITY: &str = "Simulated Instrument, Model 1234, Serial 5678, Firmware 1.0";
pub const LOAD_IDENTITY: &str = "Load Simulator, Model LS100, Serial 1234, Firmware 1.0";

fn default_fallback() -> String {
    UNKNOWN_COMMAND.to_string()
}

/// An immutable exact-match lookup table with one fallback answer.
///
/// The table carries no state between commands: `OUTP ON` followed by any
/// query answers exactly what the query alone would.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommandTable {
    #[serde(default)]
    responses: HashMap<String, String>,
    #[serde(default = "default_fallback")]
    fallback: String,
}

impl CommandTable {
    pub fn new<I, K, V>(responses: I, fallback: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            responses: responses
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            fallback: fallback.into(),
        }
    }

    /// The generic instrument: identity, a voltage measurement and readbacks.
    pub fn instrument() -> Self {
        Self::new(
            [
                ("*IDN?", INSTRUMENT_IDENTITY),
                ("MEAS:VOLT?", "3.3"),
                ("CURR?", "12"),
                ("VOLT?", "14"),
                ("POW?", "28"),
            ],
            UNKNOWN_COMMAND,
        )
    }

    /// An electronic load, which also acknowledges `SET:VALUE`.
    pub fn load() -> Self {
        Self::new(
            [
                ("*IDN?", LOAD_IDENTITY),
                ("SET:VALUE", "Load value set"),
                ("CURR?", "12"),
                ("VOLT?", "14"),
                ("POW?", "28"),
            ],
            UNKNOWN_COMMAND,
        )
    }

    /// Parses a table such as:
    ///
    /// ```toml
    /// fallback = "ERROR: Unknown command"
    ///
    /// [responses]
    /// "*IDN?" = "Bench PSU, Model 7, Serial 1, Firmware 2.1"
    /// "VOLT?" = "5.0"
    /// ```
    pub fn from_toml_str(content: &str) -> Result<Self, TableError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, TableError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Looks up `command` exactly, answering the fallback on a miss.
    pub fn lookup(&self, command: &str) -> &str {
        self.responses
            .get(command)
            .map(String::as_str)
            .unwrap_or(&self.fallback)
    }

    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    pub fn len(&self) -> usize {
        self.responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }
}

impl Default for CommandTable {
    fn default() -> Self {
        Self::instrument()
    }
}

/// The built-in tables selectable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Profile {
    #[default]
    Instrument,
    Load,
}

impl Profile {
    pub fn table(&self) -> CommandTable {
        match self {
            Profile::Instrument => CommandTable::instrument(),
            Profile::Load => CommandTable::load(),
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Profile::Instrument => f.write_str("instrument"),
            Profile::Load => f.write_str("load"),
        }
    }
}

impl FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "instrument" => Ok(Profile::Instrument),
            "load" => Ok(Profile::Load),
            other => Err(format!("unknown profile '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instrument_table_answers_known_queries() {
        let table = CommandTable::instrument();
        assert_eq!(table.lookup("*IDN?"), INSTRUMENT_IDENTITY);
        assert_eq!(table.lookup("MEAS:VOLT?"), "3.3");
        assert_eq!(table.lookup("CURR?"), "12");
        assert_eq!(table.lookup("VOLT?"), "14");
        assert_eq!(table.lookup("POW?"), "28");
    }

    #[test]
    fn lookup_is_exact_and_stateless() {
        let table = CommandTable::instrument();
        assert_eq!(table.lookup("*idn?"), UNKNOWN_COMMAND);
        assert_eq!(table.lookup("OUTP ON"), UNKNOWN_COMMAND);
        assert_eq!(table.lookup("OUTP?"), UNKNOWN_COMMAND);
        assert_eq!(table.lookup(""), UNKNOWN_COMMAND);
    }

    #[test]
    fn load_profile_acknowledges_set_value() {
        let table = "load".parse::<Profile>().unwrap().table();
        assert_eq!(table.lookup("SET:VALUE"), "Load value set");
        assert_eq!(table.lookup("*IDN?"), LOAD_IDENTITY);
        assert_eq!(table.lookup("MEAS:VOLT?"), UNKNOWN_COMMAND);
    }

    #[test]
    fn table_from_toml() {
        let table = CommandTable::from_toml_str(
            r#"
            fallback = "NAK"

            [responses]
            "*IDN?" = "Bench PSU"
            "VOLT?" = "5.0"
            "#,
        )
        .unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.lookup("VOLT?"), "5.0");
        assert_eq!(table.lookup("CURR?"), "NAK");
    }

    #[test]
    fn toml_fallback_defaults_to_unknown_command() {
        let table = CommandTable::from_toml_str("[responses]\n\"X?\" = \"1\"\n").unwrap();
        assert_eq!(table.fallback(), UNKNOWN_COMMAND);
        assert!(CommandTable::from_toml_str("responses = 3").is_err());
    }
}
