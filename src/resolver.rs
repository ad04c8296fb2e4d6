//! Connection target resolution
//!
//! Turns a connector and an optional, partially qualified target into the
//! exact peer endpoint. A bare peer name must expose exactly one connector
//! of the opposite kind with the matching interface; ambiguity is an error,
//! never a guess.

use crate::error::{Error, Result};
use snapkit::{Backend, Connection, ConnectorInfo, ConnectorKind, Endpoint};
use std::fmt;

/// Where a connection should go, as given by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// No target: the base snap for connects, every peer for disconnects
    Default,
    /// A peer snap; its connector is resolved by interface
    Peer(String),
    /// A fully qualified `snap:connector`
    Endpoint(Endpoint),
}

impl Target {
    /// Parse an optional `peer` or `peer:connector` target
    pub fn parse(target: Option<&str>) -> Self {
        match target {
            None | Some("") => Self::Default,
            Some(spec) => match Endpoint::parse(spec) {
                Some(endpoint) => Self::Endpoint(endpoint),
                None => Self::Peer(spec.to_string()),
            },
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("<default>"),
            Self::Peer(peer) => f.write_str(peer),
            Self::Endpoint(endpoint) => endpoint.fmt(f),
        }
    }
}

/// Resolves connection targets against live provider state
pub struct Resolver<'a, B: Backend> {
    backend: &'a B,
    base_snap: &'a str,
}

impl<'a, B: Backend> Resolver<'a, B> {
    pub fn new(backend: &'a B, base_snap: &'a str) -> Self {
        Self { backend, base_snap }
    }

    /// Look up a plug or slot of a snap
    pub fn connector(&self, snap: &str, kind: ConnectorKind, name: &str) -> Result<ConnectorInfo> {
        self.backend
            .connectors(snap, kind, Some(name), None)?
            .remove(name)
            .ok_or_else(|| match kind {
                ConnectorKind::Plug => Error::UnknownPlug {
                    snap: snap.to_string(),
                    plug: name.to_string(),
                },
                ConnectorKind::Slot => Error::UnknownConnector {
                    snap: snap.to_string(),
                    connector: name.to_string(),
                },
            })
    }

    /// Find out whether `name` is a plug or a slot of `snap`
    ///
    /// Plugs win when a snap carries both under the same name.
    pub fn side_of(&self, snap: &str, name: &str) -> Result<ConnectorInfo> {
        for kind in [ConnectorKind::Plug, ConnectorKind::Slot] {
            if let Some(info) = self
                .backend
                .connectors(snap, kind, Some(name), None)?
                .remove(name)
            {
                return Ok(info);
            }
        }
        Err(Error::UnknownConnector {
            snap: snap.to_string(),
            connector: name.to_string(),
        })
    }

    /// Resolve the peer endpoint for a connector on the `kind` side
    ///
    /// [`Target::Default`] resolves to the base snap's connector of the
    /// same name. The connector itself is only looked up when its
    /// interface is needed to pick a peer connector.
    pub fn resolve(
        &self,
        snap: &str,
        kind: ConnectorKind,
        name: &str,
        target: &Target,
    ) -> Result<Endpoint> {
        match target {
            Target::Endpoint(endpoint) => Ok(endpoint.clone()),
            Target::Default => Ok(Endpoint::new(self.base_snap, name)),
            Target::Peer(peer) => {
                let source = self.connector(snap, kind, name)?;
                self.pick(&source, peer)
            }
        }
    }

    /// Pick the single opposite connector on `peer` sharing the source's interface
    pub fn pick(&self, source: &ConnectorInfo, peer: &str) -> Result<Endpoint> {
        let kind = source.kind.opposite();
        let candidates = self
            .backend
            .connectors(peer, kind, None, Some(&source.interface))?;
        let found = candidates.len();
        log::debug!(
            "{} {}:{} has {found} candidate {} on {peer}",
            source.kind,
            source.snap,
            source.name,
            kind.plural()
        );

        match (candidates.into_keys().next(), found) {
            (Some(name), 1) => Ok(Endpoint::new(peer, name)),
            _ => Err(Error::Ambiguous {
                target: peer.to_string(),
                kind,
                interface: source.interface.clone(),
                found,
            }),
        }
    }
}

/// Peers connected to `own` on side `this`, optionally restricted to one peer
pub fn matching_edges(
    connections: &[Connection],
    this: ConnectorKind,
    own: &Endpoint,
    target: Option<&Endpoint>,
) -> Vec<Endpoint> {
    let mut peers: Vec<Endpoint> = connections
        .iter()
        .filter(|conn| conn.endpoint(this) == own)
        .map(|conn| conn.endpoint(this.opposite()))
        .filter(|peer| target.is_none_or(|target| *peer == target))
        .cloned()
        .collect();
    peers.sort();
    peers.dedup();
    peers
}
