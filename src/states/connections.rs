//! `connected` / `disconnected`: manage plug/slot connections

use crate::engine::{Engine, finish, tolerate_missing};
use crate::error::{Error, Result};
use crate::resolver::{Target, matching_edges};
use crate::selector::ResourceSelector;
use declarative::{ApplyContext, ChangeSet, Expectation, Plan, StateResult, execute, fan_out};
use serde_json::json;
use snapkit::{Action, Backend, ConnectorKind, Endpoint};

/// Connect `snap:plug` to `slot` unless the edge already exists
pub(crate) fn plan_connect(snap: &str, plug: &str, slot: &Endpoint, edges: &[Endpoint]) -> Plan<Action> {
    if edges.contains(slot) {
        return Plan::noop();
    }
    let mut changes = ChangeSet::new();
    changes.record("connected", slot.to_string());
    Plan::new(changes).with_step(Action::Connect {
        snap: snap.to_string(),
        plug: plug.to_string(),
        slot: slot.clone(),
    })
}

fn record_peers(typ: ConnectorKind, peers: &[Endpoint]) -> ChangeSet {
    let mut changes = ChangeSet::new();
    if !peers.is_empty() {
        let names: Vec<String> = peers.iter().map(ToString::to_string).collect();
        changes.record("disconnected", json!({ typ.plural(): names }));
    }
    changes
}

impl<B: Backend> Engine<B> {
    /// Ensure the plug `snap:plug` is connected
    ///
    /// `target` is `None` for the base snap's slot of the same name, a bare
    /// peer snap, or a `peer:slot` endpoint.
    pub fn connected(
        &self,
        snap: &str,
        plug: &str,
        target: Option<&str>,
        ctx: &ApplyContext,
    ) -> StateResult {
        let id = format!("{snap}:{plug}");
        finish(&id, self.connect(&id, snap, plug, target, ctx))
    }

    /// Ensure the plug or slot `snap:connector` has no connection to `target`
    ///
    /// Without a target every connection of the connector is cut.
    pub fn disconnected(
        &self,
        snap: &str,
        connector: &str,
        target: Option<&str>,
        ctx: &ApplyContext,
    ) -> StateResult {
        let id = format!("{snap}:{connector}");
        finish(&id, self.disconnect(&id, snap, connector, target, ctx))
    }

    fn connect(
        &self,
        id: &str,
        snap: &str,
        plug: &str,
        target: Option<&str>,
        ctx: &ApplyContext,
    ) -> Result<StateResult> {
        ResourceSelector::connector(snap, plug)?;
        let resolver = self.resolver();
        let info = match resolver.connector(snap, ConnectorKind::Plug, plug) {
            Ok(info) => info,
            Err(err) => return tolerate_missing(ctx, id, err),
        };
        let slot = match Target::parse(target) {
            Target::Peer(peer) => resolver.pick(&info, &peer),
            other => resolver.resolve(snap, ConnectorKind::Plug, plug, &other),
        };
        let slot = match slot {
            Ok(slot) => slot,
            Err(err) => return tolerate_missing(ctx, id, err),
        };
        log::debug!("{id}: resolved target slot {slot}");

        let own = Endpoint::new(snap, plug);
        let edges = |backend: &B| -> Result<Vec<Endpoint>> {
            let connections = backend.connections(snap)?;
            Ok(matching_edges(&connections, ConnectorKind::Plug, &own, Some(&slot)))
        };

        let plan = plan_connect(snap, plug, &slot, &edges(self.backend())?);
        if plan.is_noop() {
            return Ok(StateResult::unchanged(
                id,
                "The connection is already established",
            ));
        }
        if ctx.dry_run {
            return Ok(StateResult::predicted(
                id,
                plan.changes().clone(),
                format!("Would have connected plug {own} to slot {slot}"),
            ));
        }

        execute(&plan, |action| self.apply(action))?;
        let expectation = Expectation::new(
            id,
            "connected",
            "Tried to connect the plug, but the connection is not reported",
        );
        ctx.poller().wait_for(&expectation, ctx.timeout, || {
            Ok::<_, Error>(!edges(self.backend())?.is_empty())
        })?;
        Ok(StateResult::converged(
            id,
            plan.into_parts().1,
            format!("Connected plug {own} to slot {slot}"),
        ))
    }

    fn disconnect(
        &self,
        id: &str,
        snap: &str,
        connector: &str,
        target: Option<&str>,
        ctx: &ApplyContext,
    ) -> Result<StateResult> {
        ResourceSelector::connector(snap, connector)?;
        let resolver = self.resolver();
        let info = match resolver.side_of(snap, connector) {
            Ok(info) => info,
            Err(err) => return tolerate_missing(ctx, id, err),
        };
        let this = info.kind;
        let typ = this.opposite();
        let peer = match Target::parse(target) {
            Target::Default => None,
            Target::Endpoint(endpoint) => Some(endpoint),
            Target::Peer(peer) => match resolver.pick(&info, &peer) {
                Ok(endpoint) => Some(endpoint),
                Err(err) => return tolerate_missing(ctx, id, err),
            },
        };

        let own = Endpoint::new(snap, connector);
        let edges = |backend: &B| -> Result<Vec<Endpoint>> {
            let connections = backend.connections(snap)?;
            Ok(matching_edges(&connections, this, &own, peer.as_ref()))
        };

        let peers = edges(self.backend())?;
        if peers.is_empty() {
            return Ok(StateResult::unchanged(id, "The connection is already cut"));
        }
        if ctx.dry_run {
            return Ok(StateResult::predicted(
                id,
                record_peers(typ, &peers),
                format!("Would have disconnected some {}", typ.plural()),
            ));
        }

        let items = peers.iter().map(|peer| (peer.to_string(), peer.clone()));
        let failures = fan_out(items, |_, peer| {
            self.apply(&Action::Disconnect {
                snap: snap.to_string(),
                connector: connector.to_string(),
                target: Some(peer),
            })
        });

        // Only edges whose disconnect call succeeded are expected to go away
        let expectation = Expectation::new(
            id,
            "disconnected",
            format!(
                "Tried to disconnect some {}, but some connections remained",
                typ.plural()
            ),
        );
        let settled = ctx.poller().wait_for(&expectation, ctx.timeout, || {
            let remaining = edges(self.backend())?;
            Ok::<_, Error>(
                remaining
                    .iter()
                    .all(|peer| failures.contains(&peer.to_string())),
            )
        });
        match settled {
            Ok(()) | Err(Error::Timeout(_)) => {}
            Err(err) => return Err(err),
        }

        let remaining = edges(self.backend())?;
        let cut: Vec<Endpoint> = peers
            .into_iter()
            .filter(|peer| !remaining.contains(peer))
            .collect();
        let changes = record_peers(typ, &cut);

        if !failures.is_empty() {
            return Ok(StateResult::failed(id, changes, failures.to_string()));
        }
        if !remaining.is_empty() {
            return Ok(StateResult::failed(
                id,
                changes,
                format!(
                    "Tried to disconnect some {}, but some connections remained",
                    typ.plural()
                ),
            ));
        }
        Ok(StateResult::converged(
            id,
            changes,
            format!("Disconnected some {}", typ.plural()),
        ))
    }
}
