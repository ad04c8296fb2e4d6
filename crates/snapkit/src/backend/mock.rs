//! In-memory snapd backend.
//!
//! Holds a small model of snapd's state and applies [`Action`]s to it.
//! Supports fault injection: failing actions, actions acknowledged
//! without effect and service transitions that only show up after a few
//! status queries.

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::types::{
    Action, Channel, Connection, ConnectorInfo, ConnectorKind, Endpoint, InstalledSnap,
    ServiceSelector, ServiceStatus, SnapFileInfo, Upgrade,
};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct MockSnap {
    info: Option<InstalledSnap>,
    plugs: BTreeMap<String, String>,
    slots: BTreeMap<String, String>,
    services: BTreeMap<String, ServiceStatus>,
    options: BTreeMap<String, Value>,
}

impl MockSnap {
    fn connectors(&self, kind: ConnectorKind) -> &BTreeMap<String, String> {
        match kind {
            ConnectorKind::Plug => &self.plugs,
            ConnectorKind::Slot => &self.slots,
        }
    }

    fn connectors_mut(&mut self, kind: ConnectorKind) -> &mut BTreeMap<String, String> {
        match kind {
            ConnectorKind::Plug => &mut self.plugs,
            ConnectorKind::Slot => &mut self.slots,
        }
    }
}

#[derive(Debug)]
struct PendingService {
    remaining: u32,
    status: ServiceStatus,
}

/// A connect or disconnect that snapd has accepted but not reported yet
#[derive(Debug)]
enum EdgeChange {
    Connect(Connection),
    Disconnect(Vec<Connection>),
}

#[derive(Debug)]
struct PendingEdge {
    remaining: u32,
    change: EdgeChange,
}

#[derive(Debug, Default)]
struct MockState {
    /// Snaps keyed by name. Entries without `info` are not installed but
    /// keep their declared connectors and services for a later install.
    snaps: BTreeMap<String, MockSnap>,
    upgrades: BTreeMap<String, Upgrade>,
    connections: Vec<Connection>,
    files: BTreeMap<PathBuf, SnapFileInfo>,
    /// sha3-384 -> asserted revision
    assertions: BTreeMap<String, String>,
    /// assertions file -> (sha3-384, revision) it would import
    assertion_files: BTreeMap<PathBuf, (String, String)>,
    failures: BTreeMap<(String, String), String>,
    inert: BTreeSet<(String, String)>,
    service_delay: u32,
    pending: BTreeMap<String, PendingService>,
    connection_delay: u32,
    pending_edges: Vec<PendingEdge>,
    calls: Vec<Action>,
}

impl MockState {
    fn installed(&self, name: &str) -> Result<&MockSnap> {
        self.snaps
            .get(name)
            .filter(|snap| snap.info.is_some())
            .ok_or_else(|| Error::NotInstalled {
                name: name.to_string(),
            })
    }

    fn installed_mut(&mut self, name: &str) -> Result<&mut MockSnap> {
        self.snaps
            .get_mut(name)
            .filter(|snap| snap.info.is_some())
            .ok_or_else(|| Error::NotInstalled {
                name: name.to_string(),
            })
    }

    fn info_mut(&mut self, name: &str) -> Result<&mut InstalledSnap> {
        self.installed_mut(name)?
            .info
            .as_mut()
            .ok_or_else(|| Error::NotInstalled {
                name: name.to_string(),
            })
    }

    fn service_mut(&mut self, service: &str) -> Result<&mut ServiceStatus> {
        let snap = ServiceSelector::service(service).snap().to_string();
        self.installed_mut(&snap)?
            .services
            .get_mut(service)
            .ok_or_else(|| Error::command("service", format!("unknown service: {service}")))
    }

    /// Move pending service transitions one query closer to taking effect.
    fn tick(&mut self, selector: &ServiceSelector) {
        let due: Vec<String> = self
            .pending
            .iter_mut()
            .filter(|(name, _)| selector.matches(name))
            .filter_map(|(name, pending)| {
                pending.remaining = pending.remaining.saturating_sub(1);
                (pending.remaining == 0).then(|| name.clone())
            })
            .collect();

        for name in due {
            if let Some(pending) = self.pending.remove(&name)
                && let Ok(status) = self.service_mut(&name)
            {
                *status = pending.status;
            }
        }
    }

    fn transition(&mut self, service: &str, status: ServiceStatus) -> Result<()> {
        let remaining = self.service_delay;
        let current = self.service_mut(service)?;
        if remaining == 0 {
            *current = status;
            return Ok(());
        }
        self.pending
            .insert(service.to_string(), PendingService { remaining, status });
        Ok(())
    }

    fn apply_edge(&mut self, change: EdgeChange) {
        match change {
            EdgeChange::Connect(connection) => {
                if !self.connections.contains(&connection) {
                    self.connections.push(connection);
                }
            }
            EdgeChange::Disconnect(removed) => {
                self.connections.retain(|conn| !removed.contains(conn));
            }
        }
    }

    fn propagate(&mut self, change: EdgeChange) {
        let remaining = self.connection_delay;
        if remaining == 0 {
            self.apply_edge(change);
        } else {
            self.pending_edges.push(PendingEdge { remaining, change });
        }
    }

    /// Move pending connection changes one query closer to being reported.
    fn tick_edges(&mut self) {
        let mut due = Vec::new();
        for mut pending in std::mem::take(&mut self.pending_edges) {
            pending.remaining = pending.remaining.saturating_sub(1);
            if pending.remaining == 0 {
                due.push(pending.change);
            } else {
                self.pending_edges.push(pending);
            }
        }
        for change in due {
            self.apply_edge(change);
        }
    }

    fn connector_kind(&self, snap: &str, name: &str) -> Result<ConnectorKind> {
        let entry = self.installed(snap)?;
        if entry.plugs.contains_key(name) {
            Ok(ConnectorKind::Plug)
        } else if entry.slots.contains_key(name) {
            Ok(ConnectorKind::Slot)
        } else {
            Err(Error::NoSuchConnector {
                snap: snap.to_string(),
                kind: "plug or slot".to_string(),
                name: name.to_string(),
            })
        }
    }

    fn install(
        &mut self,
        name: &str,
        channel: Option<&Channel>,
        revision: Option<&String>,
        classic: bool,
        refresh: bool,
    ) -> Result<()> {
        if let Some(file) = self.files.get(Path::new(name)).cloned() {
            let revision = self
                .assertions
                .get(&file.sha3_384)
                .cloned()
                .unwrap_or_else(|| "x1".to_string());
            let entry = self.snaps.entry(file.name.clone()).or_default();
            let info = entry
                .info
                .get_or_insert_with(|| InstalledSnap::new(&file.name, "", revision.clone()));
            info.revision = revision;
            info.classic = classic;
            return Ok(());
        }

        let upgrade = self.upgrades.get(name).cloned();
        let entry = self.snaps.entry(name.to_string()).or_default();
        let Some(info) = entry.info.as_mut() else {
            if refresh {
                return Err(Error::NotInstalled {
                    name: name.to_string(),
                });
            }
            let channel = channel.cloned().unwrap_or_default();
            let revision = revision.cloned().unwrap_or_else(|| "1".to_string());
            let mut info = InstalledSnap::new(name, channel.as_str(), revision);
            info.classic = classic;
            entry.info = Some(info);
            return Ok(());
        };
        if !refresh {
            return Err(Error::command(
                format!("install {name}"),
                format!("snap \"{name}\" is already installed"),
            ));
        }

        if let Some(channel) = channel {
            info.channel = channel.to_string();
        }
        if let Some(revision) = revision {
            info.revision = revision.clone();
        }
        info.classic = classic;
        if upgrade.is_some_and(|u| u.revision == info.revision) {
            self.upgrades.remove(name);
        self.pending_edges.retain(|pending| match &pending.change {
            EdgeChange::Connect(conn) => conn.plug.snap != name && conn.slot.snap != name,
            EdgeChange::Disconnect(_) => true,
        });
        }
        Ok(())
    }

    fn connect(&mut self, snap: &str, plug: &str, slot: &Endpoint) -> Result<()> {
        let plug_interface = self
            .installed(snap)?
            .plugs
            .get(plug)
            .cloned()
            .ok_or_else(|| Error::NoSuchConnector {
                snap: snap.to_string(),
                kind: "plug".to_string(),
                name: plug.to_string(),
            })?;
        let slot_interface = self
            .installed(&slot.snap)?
            .slots
            .get(&slot.name)
            .cloned()
            .ok_or_else(|| Error::NoSuchConnector {
                snap: slot.snap.clone(),
                kind: "slot".to_string(),
                name: slot.name.clone(),
            })?;
        if plug_interface != slot_interface {
            return Err(Error::command(
                format!("connect {snap}:{plug}"),
                format!("interface mismatch: {plug_interface} != {slot_interface}"),
            ));
        }

        let connection = Connection::new(Endpoint::new(snap, plug), slot.clone(), plug_interface);
        self.propagate(EdgeChange::Connect(connection));
        Ok(())
    }

    fn disconnect(&mut self, snap: &str, connector: &str, target: Option<&Endpoint>) -> Result<()> {
        let this = self.connector_kind(snap, connector)?;
        let own = Endpoint::new(snap, connector);
        let removed: Vec<Connection> = self
            .connections
            .iter()
            .filter(|conn| {
                conn.endpoint(this) == &own
                    && target.is_none_or(|target| conn.endpoint(this.opposite()) == target)
            })
            .cloned()
            .collect();
        self.propagate(EdgeChange::Disconnect(removed));
        Ok(())
    }

    fn remove(&mut self, name: &str) -> Result<()> {
        self.installed_mut(name)?.info = None;
        self.connections
            .retain(|conn| conn.plug.snap != name && conn.slot.snap != name);
        self.upgrades.remove(name);
        self.pending.retain(|service, _| !ServiceSelector::Snap(name.to_string()).matches(service));
        Ok(())
    }

    fn perform(&mut self, action: &Action) -> Result<()> {
        match action {
            Action::Install {
                name,
                channel,
                revision,
                classic,
                refresh,
            } => self.install(name, channel.as_ref(), revision.as_ref(), *classic, *refresh),
            Action::Remove { name, .. } => self.remove(name),
            Action::Enable { name } => {
                self.info_mut(name)?.enabled = true;
                Ok(())
            }
            Action::Disable { name } => {
                self.info_mut(name)?.enabled = false;
                Ok(())
            }
            Action::Hold { name } => {
                self.info_mut(name)?.held = true;
                Ok(())
            }
            Action::Unhold { name } => {
                self.info_mut(name)?.held = false;
                Ok(())
            }
            Action::Connect { snap, plug, slot } => self.connect(snap, plug, slot),
            Action::Disconnect {
                snap,
                connector,
                target,
            } => self.disconnect(snap, connector, target.as_ref()),
            Action::ServiceStart { service, enable } => {
                let current = *self.service_mut(service)?;
                let status = ServiceStatus::new(current.enabled || *enable, true);
                self.transition(service, status)
            }
            Action::ServiceStop { service, disable } => {
                let current = *self.service_mut(service)?;
                let status = ServiceStatus::new(current.enabled && !*disable, false);
                self.transition(service, status)
            }
            Action::ServiceRestart { service, .. } => {
                let current = *self.service_mut(service)?;
                self.transition(service, ServiceStatus::new(current.enabled, true))
            }
            Action::OptionSet { snap, key, value } => {
                self.installed_mut(snap)?
                    .options
                    .insert(key.clone(), value.clone());
                Ok(())
            }
            Action::OptionUnset { snap, key } => {
                self.installed_mut(snap)?.options.remove(key);
                Ok(())
            }
            Action::Ack { path } => {
                let (sha3, revision) = self.assertion_files.get(path).cloned().ok_or_else(|| {
                    Error::command(
                        "ack",
                        format!("cannot read assertions from {}", path.display()),
                    )
                })?;
                self.assertions.insert(sha3, revision);
                Ok(())
            }
        }
    }
}

/// In-memory snapd backend with fault injection and a call log.
#[derive(Debug, Default)]
pub struct MockBackend {
    state: Mutex<MockState>,
}

impl MockBackend {
    /// Create an empty backend: nothing installed.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Install a snap.
    pub fn add_snap(&self, snap: InstalledSnap) -> &Self {
        let name = snap.name.clone();
        self.lock().snaps.entry(name).or_default().info = Some(snap);
        self
    }

    /// Declare a plug. The snap does not have to be installed yet.
    pub fn add_plug(&self, snap: &str, plug: &str, interface: &str) -> &Self {
        self.add_connector(snap, ConnectorKind::Plug, plug, interface)
    }

    /// Declare a slot. The snap does not have to be installed yet.
    pub fn add_slot(&self, snap: &str, slot: &str, interface: &str) -> &Self {
        self.add_connector(snap, ConnectorKind::Slot, slot, interface)
    }

    fn add_connector(&self, snap: &str, kind: ConnectorKind, name: &str, interface: &str) -> &Self {
        self.lock()
            .snaps
            .entry(snap.to_string())
            .or_default()
            .connectors_mut(kind)
            .insert(name.to_string(), interface.to_string());
        self
    }

    /// Establish a connection between `plug` and `slot`.
    pub fn add_connection(&self, plug: Endpoint, slot: Endpoint, interface: &str) -> &Self {
        self.lock()
            .connections
            .push(Connection::new(plug, slot, interface));
        self
    }

    /// Declare a service `<snap>.<app>`.
    pub fn add_service(&self, snap: &str, app: &str, status: ServiceStatus) -> &Self {
        self.lock()
            .snaps
            .entry(snap.to_string())
            .or_default()
            .services
            .insert(format!("{snap}.{app}"), status);
        self
    }

    /// Set a flattened option value.
    pub fn set_option(&self, snap: &str, key: &str, value: Value) -> &Self {
        self.lock()
            .snaps
            .entry(snap.to_string())
            .or_default()
            .options
            .insert(key.to_string(), value);
        self
    }

    /// Offer an upgrade to `revision`.
    pub fn add_upgrade(&self, name: &str, revision: &str) -> &Self {
        self.lock().upgrades.insert(
            name.to_string(),
            Upgrade {
                name: name.to_string(),
                version: "2.0".to_string(),
                revision: revision.to_string(),
            },
        );
        self
    }

    /// Register a local `.snap` file.
    pub fn add_snap_file(&self, path: impl Into<PathBuf>, name: &str, sha3_384: &str) -> &Self {
        self.lock().files.insert(
            path.into(),
            SnapFileInfo {
                name: name.to_string(),
                sha3_384: sha3_384.to_string(),
            },
        );
        self
    }

    /// Make a `snap-revision` assertion known.
    pub fn add_assertion(&self, sha3_384: &str, revision: &str) -> &Self {
        self.lock()
            .assertions
            .insert(sha3_384.to_string(), revision.to_string());
        self
    }

    /// Register an assertions file that an [`Action::Ack`] can import.
    pub fn add_assertion_file(
        &self,
        path: impl Into<PathBuf>,
        sha3_384: &str,
        revision: &str,
    ) -> &Self {
        self.lock().assertion_files.insert(
            path.into(),
            (sha3_384.to_string(), revision.to_string()),
        );
        self
    }

    /// Make every action of `kind` on `target` fail with `message`.
    pub fn fail_action(&self, kind: &str, target: &str, message: &str) -> &Self {
        self.lock().failures.insert(
            (kind.to_string(), target.to_string()),
            message.to_string(),
        );
        self
    }

    /// Acknowledge actions of `kind` on `target` without applying them.
    pub fn ignore_action(&self, kind: &str, target: &str) -> &Self {
        self.lock()
            .inert
            .insert((kind.to_string(), target.to_string()));
        self
    }

    /// Delay service transitions until `polls` status queries have passed.
    pub fn set_service_delay(&self, polls: u32) -> &Self {
        self.lock().service_delay = polls;
        self
    }

    /// Delay connects and disconnects until `polls` connection queries have passed.
    pub fn set_connection_delay(&self, polls: u32) -> &Self {
        self.lock().connection_delay = polls;
        self
    }

    /// Every action passed to [`Backend::apply`], in order.
    pub fn calls(&self) -> Vec<Action> {
        self.lock().calls.clone()
    }
}

impl Backend for MockBackend {
    fn list(&self, name: &str) -> Result<Option<InstalledSnap>> {
        Ok(self
            .lock()
            .snaps
            .get(name)
            .and_then(|snap| snap.info.clone()))
    }

    fn list_upgrades(&self) -> Result<BTreeMap<String, Upgrade>> {
        Ok(self.lock().upgrades.clone())
    }

    fn connectors(
        &self,
        snap: &str,
        kind: ConnectorKind,
        name: Option<&str>,
        interface: Option<&str>,
    ) -> Result<BTreeMap<String, ConnectorInfo>> {
        let state = self.lock();
        let entry = state.installed(snap)?;
        Ok(entry
            .connectors(kind)
            .iter()
            .filter(|(connector, _)| name.is_none_or(|n| n == connector.as_str()))
            .filter(|(_, iface)| interface.is_none_or(|i| i == iface.as_str()))
            .map(|(connector, iface)| {
                let own = Endpoint::new(snap, connector.as_str());
                let connections = state
                    .connections
                    .iter()
                    .filter(|conn| conn.endpoint(kind) == &own)
                    .map(|conn| conn.endpoint(kind.opposite()).clone())
                    .collect();
                let info = ConnectorInfo {
                    snap: snap.to_string(),
                    name: connector.clone(),
                    kind,
                    interface: iface.clone(),
                    connections,
                };
                (connector.clone(), info)
            })
            .collect())
    }

    fn connections(&self, snap: &str) -> Result<Vec<Connection>> {
        let mut state = self.lock();
        state.installed(snap)?;
        state.tick_edges();
        Ok(state
            .connections
            .iter()
            .filter(|conn| conn.plug.snap == snap || conn.slot.snap == snap)
            .cloned()
            .collect())
    }

    fn services(&self, selector: &ServiceSelector) -> Result<BTreeMap<String, ServiceStatus>> {
        let mut state = self.lock();
        state.tick(selector);
        Ok(state
            .installed(selector.snap())
            .map(|snap| {
                snap.services
                    .iter()
                    .filter(|(name, _)| selector.matches(name))
                    .map(|(name, status)| (name.clone(), *status))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn options(&self, snap: &str) -> Result<BTreeMap<String, Value>> {
        Ok(self.lock().installed(snap)?.options.clone())
    }

    fn file_info(&self, path: &Path) -> Result<SnapFileInfo> {
        self.lock()
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| Error::SnapFile {
                path: path.to_path_buf(),
            })
    }

    fn known_revision(&self, sha3_384: &str) -> Result<Option<String>> {
        Ok(self.lock().assertions.get(sha3_384).cloned())
    }

    fn apply(&self, action: &Action) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(action.clone());

        let key = (action.kind().to_string(), action.target());
        if let Some(message) = state.failures.get(&key) {
            return Err(Error::command(action.to_string(), message.clone()));
        }
        if state.inert.contains(&key) {
            log::debug!("mock: ignoring {action}");
            return Ok(());
        }
        state.perform(action)
    }
}
