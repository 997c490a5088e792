//! Named groups of endpoints.

use crate::dispatch::fan_out;
use crate::endpoint::Endpoint;
use crate::error::{EndpointError, RegistryError, Result};
use crate::loader::EndpointRecord;
use log::{info, warn};
use std::collections::btree_map::{self, BTreeMap};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// The two groups an operator can address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Group {
    Loads,
    Sources,
}

impl Group {
    pub const ALL: [Group; 2] = [Group::Loads, Group::Sources];

    /// Prefix used for identities created from a bare port number.
    pub fn identity_prefix(&self) -> &'static str {
        match self {
            Group::Loads => "Load",
            Group::Sources => "Source",
        }
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Group::Loads => f.write_str("loads"),
            Group::Sources => f.write_str("sources"),
        }
    }
}

impl FromStr for Group {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "loads" | "load" => Ok(Group::Loads),
            "sources" | "source" => Ok(Group::Sources),
            other => Err(format!("unknown group '{}'", other)),
        }
    }
}

/// The members of one group, keyed by port.
#[derive(Debug)]
pub struct EndpointGroup {
    kind: Group,
    members: BTreeMap<u16, Endpoint>,
}

impl EndpointGroup {
    pub fn new(kind: Group) -> Self {
        Self {
            kind,
            members: BTreeMap::new(),
        }
    }

    pub fn kind(&self) -> Group {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn get(&self, port: u16) -> Option<&Endpoint> {
        self.members.get(&port)
    }

    pub fn iter(&self) -> btree_map::Values<'_, u16, Endpoint> {
        self.members.values()
    }

    pub fn iter_mut(&mut self) -> btree_map::ValuesMut<'_, u16, Endpoint> {
        self.members.values_mut()
    }

    /// Inserts `endpoint` under its port, handing back any endpoint it replaced.
    ///
    /// Identities are unique within a group: an identity already held by a
    /// member on another port is rejected and `endpoint` is dropped.
    /// A replaced endpoint is not disconnected here. Its socket stays open
    /// until the caller disconnects or drops it.
    pub fn insert(
        &mut self,
        endpoint: Endpoint,
    ) -> std::result::Result<Option<Endpoint>, RegistryError> {
        if let Some(holder) = self
            .members
            .values()
            .find(|m| m.identity() == endpoint.identity() && m.port() != endpoint.port())
        {
            return Err(RegistryError::DuplicateIdentity {
                group: self.kind,
                identity: endpoint.identity().to_string(),
                port: endpoint.port(),
                held_by: holder.port(),
            });
        }

        let replaced = self.members.insert(endpoint.port(), endpoint);
        if let Some(prior) = &replaced {
            warn!(
                "{}: replaced {} on port {} ({})",
                self.kind,
                prior.identity(),
                prior.port(),
                prior.state()
            );
        }
        Ok(replaced)
    }

    fn disconnect_all(&mut self) {
        for endpoint in self.members.values_mut() {
            endpoint.disconnect();
        }
    }
}

/// Both groups, addressed by [`Group`].
#[derive(Debug)]
pub struct EndpointRegistry {
    loads: EndpointGroup,
    sources: EndpointGroup,
}

impl Default for EndpointRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self {
            loads: EndpointGroup::new(Group::Loads),
            sources: EndpointGroup::new(Group::Sources),
        }
    }

    pub fn group(&self, group: Group) -> &EndpointGroup {
        match group {
            Group::Loads => &self.loads,
            Group::Sources => &self.sources,
        }
    }

    pub fn group_mut(&mut self, group: Group) -> &mut EndpointGroup {
        match group {
            Group::Loads => &mut self.loads,
            Group::Sources => &mut self.sources,
        }
    }

    /// Total number of endpoints across both groups.
    pub fn len(&self) -> usize {
        self.loads.len() + self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Adds `endpoint` to `group`, returning the endpoint it replaced, if any.
    pub fn add(
        &mut self,
        group: Group,
        endpoint: Endpoint,
    ) -> std::result::Result<Option<Endpoint>, RegistryError> {
        self.group_mut(group).insert(endpoint)
    }

    /// Adds one endpoint per port on `host`, named `Load-{port}` or `Source-{port}`.
    ///
    /// Returns the endpoints that were replaced. Stops at the first rejected
    /// identity; ports before it stay added.
    pub fn add_ports(
        &mut self,
        group: Group,
        host: &str,
        ports: &[u16],
    ) -> std::result::Result<Vec<Endpoint>, RegistryError> {
        let mut replaced = Vec::new();
        for &port in ports {
            let identity = format!("{}-{}", group.identity_prefix(), port);
            replaced.extend(self.add(group, Endpoint::new(identity, host, port))?);
        }
        Ok(replaced)
    }

    /// Adds the endpoints described by bulk-loaded records.
    ///
    /// Returns the endpoints that were replaced, together with their group.
    pub fn populate<I>(
        &mut self,
        records: I,
    ) -> std::result::Result<Vec<(Group, Endpoint)>, RegistryError>
    where
        I: IntoIterator<Item = EndpointRecord>,
    {
        let mut replaced = Vec::new();
        for record in records {
            let endpoint = Endpoint::new(record.name, record.host, record.port);
            if let Some(prior) = self.add(record.group, endpoint)? {
                replaced.push((record.group, prior));
            }
        }
        Ok(replaced)
    }

    /// Connects every member of `group` concurrently.
    ///
    /// One member failing does not stop the others; each outcome is reported
    /// under that member's identity. Members that are already connected
    /// report success without reconnecting.
    pub fn connect_all(
        &mut self,
        group: Group,
        timeout: Duration,
    ) -> BTreeMap<String, Result<()>> {
        let members = self.group_mut(group);
        info!("{}: connecting {} endpoint(s)", group, members.len());
        fan_out(members, |endpoint| {
            if endpoint.is_connected() {
                return Ok(());
            }
            endpoint.connect(timeout)
        })
        .into_iter()
        .map(|(identity, (_, outcome))| {
            if let Err(err) = &outcome {
                warn!("{}: {}", identity, err);
            }
            (identity, outcome)
        })
        .collect()
    }

    /// Disconnects every endpoint in every group, then empties the registry.
    pub fn disconnect_all(&mut self) {
        self.loads.disconnect_all();
        self.sources.disconnect_all();
        self.loads.members.clear();
        self.sources.members.clear();
        info!("disconnected all endpoints");
    }
}

/// Connection failures collected by [`EndpointRegistry::connect_all`].
pub fn connect_failures(
    outcomes: &BTreeMap<String, Result<()>>,
) -> impl Iterator<Item = (&str, &EndpointError)> {
    outcomes
        .iter()
        .filter_map(|(identity, outcome)| outcome.as_ref().err().map(|e| (identity.as_str(), e)))
}
