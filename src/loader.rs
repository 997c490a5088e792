//! Bulk endpoint definitions read from CSV.
//!
//! The expected header is `Name,IP,Port,Type`, where `Type` names the group
//! (`loads` or `sources`, singular accepted).

use crate::error::LoadError;
use crate::registry::Group;
use serde::Deserialize;
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

/// One endpoint as described by a bulk record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointRecord {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub group: Group,
}

#[derive(Debug, Deserialize)]
struct RawRecord {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "IP")]
    ip: String,
    #[serde(rename = "Port")]
    port: String,
    #[serde(rename = "Type")]
    kind: String,
}

pub fn load_csv<R: Read>(reader: R) -> Result<Vec<EndpointRecord>, LoadError> {
    let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut records = Vec::new();
    let mut seen = HashSet::new();

    for row in csv_reader.deserialize() {
        let raw: RawRecord = row?;
        // Header is line 1.
        let line = records.len() as u64 + 2;

        let port = raw.port.parse::<u16>().map_err(|_| LoadError::InvalidPort {
            line,
            value: raw.port.clone(),
        })?;
        let group = raw.kind.parse::<Group>().map_err(|_| LoadError::UnknownGroup {
            line,
            value: raw.kind.clone(),
        })?;
        if !seen.insert((group, raw.name.clone())) {
            return Err(LoadError::DuplicateName {
                line,
                name: raw.name,
            });
        }

        records.push(EndpointRecord {
            name: raw.name,
            host: raw.ip,
            port,
            group,
        });
    }

    log::info!("loaded {} endpoint record(s)", records.len());
    Ok(records)
}

pub fn load_csv_file(path: &Path) -> Result<Vec<EndpointRecord>, LoadError> {
    let file = std::fs::File::open(path).map_err(csv::Error::from)?;
    load_csv(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_records_into_groups() {
        let csv = "Name,IP,Port,Type\n\
                   Load A,10.3.200.10,5000,Loads\n\
                   PSU 1, 10.3.200.11 ,5025,source\n";
        let records = load_csv(csv.as_bytes()).unwrap();
        assert_eq!(
            records,
            vec![
                EndpointRecord {
                    name: "Load A".into(),
                    host: "10.3.200.10".into(),
                    port: 5000,
                    group: Group::Loads,
                },
                EndpointRecord {
                    name: "PSU 1".into(),
                    host: "10.3.200.11".into(),
                    port: 5025,
                    group: Group::Sources,
                },
            ]
        );
    }

    #[test]
    fn rejects_bad_rows_with_line_numbers() {
        let bad_port = "Name,IP,Port,Type\nA,h,5000,loads\nB,h,99999,loads\n";
        let err = load_csv(bad_port.as_bytes()).unwrap_err();
        assert_eq!(err.to_string(), "line 3: invalid port '99999'");

        let bad_group = "Name,IP,Port,Type\nA,h,5000,meters\n";
        assert!(matches!(
            load_csv(bad_group.as_bytes()),
            Err(LoadError::UnknownGroup { line: 2, .. })
        ));

        let duplicate = "Name,IP,Port,Type\nA,h,5000,loads\nA,h,5001,loads\n";
        assert!(matches!(
            load_csv(duplicate.as_bytes()),
            Err(LoadError::DuplicateName { line: 3, .. })
        ));
    }

    #[test]
    fn reads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Name,IP,Port,Type").unwrap();
        writeln!(file, "Source-7,127.0.0.1,7,sources").unwrap();
        let records = load_csv_file(file.path()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].group, Group::Sources);
    }
}
