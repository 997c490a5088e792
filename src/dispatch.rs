//! Concurrent fan-out of one command to every endpoint in a group.

use crate::config::ClientConfig;
use crate::endpoint::Endpoint;
use crate::error::{EndpointError, Result};
use crate::protocol::{Command, Response};
use crate::registry::EndpointGroup;
use log::{debug, info};
use std::collections::btree_map::{self, BTreeMap};
use std::thread;
use std::time::{Duration, Instant};

/// Runs `work` on every member of `group`, one scoped thread per member.
///
/// Returns only once every worker has finished. Each worker owns a distinct
/// `&mut Endpoint` and reports under that endpoint's identity, so results are
/// collected from the join handles without any shared map. A panicking worker
/// is reported as [`EndpointError::WorkerPanicked`] for its own endpoint.
pub(crate) fn fan_out<R, F>(group: &mut EndpointGroup, work: F) -> BTreeMap<String, (u16, Result<R>)>
where
    R: Send,
    F: Fn(&mut Endpoint) -> Result<R> + Sync,
{
    let work = &work;
    thread::scope(|scope| {
        let workers: Vec<_> = group
            .iter_mut()
            .map(|endpoint| {
                let identity = endpoint.identity().to_string();
                let port = endpoint.port();
                let handle = thread::Builder::new()
                    .name(format!("endpoint-{}", port))
                    .spawn_scoped(scope, move || work(endpoint));
                (identity, port, handle)
            })
            .collect();

        workers
            .into_iter()
            .map(|(identity, port, handle)| {
                let outcome = match handle {
                    Ok(handle) => handle.join().unwrap_or(Err(EndpointError::WorkerPanicked)),
                    Err(spawn_error) => Err(EndpointError::Io(spawn_error)),
                };
                (identity, (port, outcome))
            })
            .collect()
    })
}

/// One endpoint's share of a [`DispatchResult`].
#[derive(Debug)]
pub struct DispatchEntry {
    pub port: u16,
    pub outcome: Result<Response>,
}

/// Per-endpoint outcomes of one dispatch, keyed by identity.
///
/// Holds exactly one entry per endpoint that took part, whatever happened to
/// it. Built fresh by every call and never touched after it is returned.
#[derive(Debug)]
pub struct DispatchResult {
    command: Command,
    entries: BTreeMap<String, DispatchEntry>,
}

impl DispatchResult {
    pub fn command(&self) -> &Command {
        &self.command
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, identity: &str) -> Option<&DispatchEntry> {
        self.entries.get(identity)
    }

    /// Entries in identity order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, DispatchEntry> {
        self.entries.iter()
    }

    pub fn succeeded(&self) -> impl Iterator<Item = (&str, &Response)> {
        self.entries
            .iter()
            .filter_map(|(id, entry)| entry.outcome.as_ref().ok().map(|r| (id.as_str(), r)))
    }

    pub fn failed(&self) -> impl Iterator<Item = (&str, &EndpointError)> {
        self.entries
            .iter()
            .filter_map(|(id, entry)| entry.outcome.as_ref().err().map(|e| (id.as_str(), e)))
    }

    /// Formats every entry as `{identity} ({port}): {command} -> {outcome}`.
    pub fn render(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|(identity, entry)| {
                let outcome = match &entry.outcome {
                    Ok(response) => response.to_string(),
                    Err(err) => err.to_string(),
                };
                format!("{} ({}): {} -> {}", identity, entry.port, self.command, outcome)
            })
            .collect()
    }
}

impl IntoIterator for DispatchResult {
    type Item = (String, DispatchEntry);
    type IntoIter = btree_map::IntoIter<String, DispatchEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Sends one command to a whole group at once.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    timeout: Duration,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::from_config(&ClientConfig::default())
    }
}

impl Dispatcher {
    /// Creates a dispatcher that gives each endpoint `timeout` per call.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.command_timeout)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Sends `command` to every member of `group`, waiting for a reply from
    /// each if it is a query.
    pub fn dispatch(&self, group: &mut EndpointGroup, command: &Command) -> DispatchResult {
        self.dispatch_with(group, command, command.is_query())
    }

    /// Like [`dispatch`](Self::dispatch) with the query decision made by the caller.
    ///
    /// All endpoints run concurrently and the call returns after the last one
    /// finishes. A failing endpoint only affects its own entry.
    pub fn dispatch_with(
        &self,
        group: &mut EndpointGroup,
        command: &Command,
        expect_response: bool,
    ) -> DispatchResult {
        let start = Instant::now();
        info!("{}: dispatching {:?} to {} endpoint(s)", group.kind(), command.as_str(), group.len());

        let timeout = self.timeout;
        let entries: BTreeMap<_, _> = fan_out(group, |endpoint| {
            endpoint.send_command(command, expect_response, timeout)
        })
        .into_iter()
        .map(|(identity, (port, outcome))| (identity, DispatchEntry { port, outcome }))
        .collect();

        let result = DispatchResult {
            command: command.clone(),
            entries,
        };
        debug!(
            "{:?}: {} ok, {} failed in {:?}",
            command.as_str(),
            result.succeeded().count(),
            result.failed().count(),
            start.elapsed()
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::registry::{EndpointRegistry, Group};

    #[test]
    fn empty_group_yields_empty_result() {
        let mut registry = EndpointRegistry::new();
        let command = Command::new("*IDN?").unwrap();
        let result = Dispatcher::default().dispatch(registry.group_mut(Group::Loads), &command);
        assert!(result.is_empty());
    }

    #[test]
    fn every_member_gets_an_entry_even_when_disconnected() {
        let mut registry = EndpointRegistry::new();
        registry.add_ports(Group::Sources, "127.0.0.1", &[5001, 5002, 5003]).unwrap();
        let command = Command::new("VOLT?").unwrap();

        let result = Dispatcher::new(Duration::from_millis(100))
            .dispatch(registry.group_mut(Group::Sources), &command);

        assert_eq!(result.len(), 3);
        assert_eq!(result.failed().count(), 3);
        for (_, entry) in result.iter() {
            let err = entry.outcome.as_ref().unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Connection);
        }
    }

    #[test]
    fn render_uses_presentation_format() {
        let mut registry = EndpointRegistry::new();
        registry.add_ports(Group::Loads, "127.0.0.1", &[5025]).unwrap();
        let command = Command::new("*RST").unwrap();
        let result = Dispatcher::default().dispatch(registry.group_mut(Group::Loads), &command);

        assert_eq!(
            result.render(),
            vec!["Load-5025 (5025): *RST -> Connection Error: Not connected to 127.0.0.1:5025."]
        );
    }

    #[test]
    fn panicking_worker_is_reported_not_propagated() {
        let mut registry = EndpointRegistry::new();
        registry.add_ports(Group::Loads, "127.0.0.1", &[1, 2]).unwrap();
        let outcomes = fan_out(registry.group_mut(Group::Loads), |endpoint| {
            if endpoint.port() == 1 {
                panic!("boom");
            }
            Ok(endpoint.port())
        });
        assert_eq!(outcomes.len(), 2);
        assert!(matches!(outcomes["Load-1"].1, Err(EndpointError::WorkerPanicked)));
        assert_eq!(outcomes["Load-2"].1.as_ref().unwrap(), &2);
    }
}
