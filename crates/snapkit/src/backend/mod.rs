//! Backend abstraction for snapd operations.
//!
//! The [`Backend`] trait is the narrow query/command seam the
//! reconciliation layer talks to. Implementations own whatever transport
//! they need (the snapd REST socket, the `snap` CLI); the in-memory
//! [`mock::MockBackend`] serves tests and embedding.

pub mod mock;

use crate::error::{Error, Result};
use crate::types::{
    Action, Connection, ConnectorInfo, ConnectorKind, InstalledSnap, ServiceSelector,
    ServiceStatus, SnapFileInfo, Upgrade,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Backend trait for snapd operations.
///
/// Query methods never mutate. Every mutation goes through [`Backend::apply`]
/// so callers can log, dry-run and fault-inject one descriptor type.
pub trait Backend: Send + Sync {
    /// Look up an installed snap. `Ok(None)` when it is not installed.
    fn list(&self, name: &str) -> Result<Option<InstalledSnap>>;

    /// Available upgrades for installed snaps, keyed by snap name.
    fn list_upgrades(&self) -> Result<BTreeMap<String, Upgrade>>;

    /// Plugs or slots of a snap, keyed by connector name, optionally
    /// filtered by name and interface.
    ///
    /// Fails with [`Error::NotInstalled`] when the snap is missing.
    fn connectors(
        &self,
        snap: &str,
        kind: ConnectorKind,
        name: Option<&str>,
        interface: Option<&str>,
    ) -> Result<BTreeMap<String, ConnectorInfo>>;

    /// Established connections the snap takes part in, on either side.
    ///
    /// Fails with [`Error::NotInstalled`] when the snap is missing.
    fn connections(&self, snap: &str) -> Result<Vec<Connection>>;

    /// Status of the selected services, keyed by `<snap>.<app>`.
    ///
    /// An empty map means no service matched.
    fn services(&self, selector: &ServiceSelector) -> Result<BTreeMap<String, ServiceStatus>>;

    /// Configuration of a snap, flattened to dotted keys.
    ///
    /// Fails with [`Error::NotInstalled`] when the snap is missing.
    fn options(&self, snap: &str) -> Result<BTreeMap<String, Value>>;

    /// Identity of a local `.snap` file.
    fn file_info(&self, path: &Path) -> Result<SnapFileInfo>;

    /// Revision asserted by a known `snap-revision` assertion for a digest.
    fn known_revision(&self, sha3_384: &str) -> Result<Option<String>>;

    /// Perform a mutating operation.
    fn apply(&self, action: &Action) -> Result<()>;

    /// Check if a snap is installed.
    fn is_installed(&self, name: &str) -> Result<bool> {
        Ok(self.list(name)?.is_some())
    }

    /// Check if an installed snap is enabled.
    fn is_enabled(&self, name: &str) -> Result<bool> {
        self.list(name)?
            .map(|snap| snap.enabled)
            .ok_or_else(|| Error::NotInstalled {
                name: name.to_string(),
            })
    }

    /// Plugs of a snap.
    fn plugs(&self, snap: &str, name: Option<&str>) -> Result<BTreeMap<String, ConnectorInfo>> {
        self.connectors(snap, ConnectorKind::Plug, name, None)
    }

    /// Slots of a snap.
    fn slots(&self, snap: &str, name: Option<&str>) -> Result<BTreeMap<String, ConnectorInfo>> {
        self.connectors(snap, ConnectorKind::Slot, name, None)
    }

    /// Status of one fully qualified service, `None` if it does not exist.
    fn service_status(&self, service: &str) -> Result<Option<ServiceStatus>> {
        Ok(self
            .services(&ServiceSelector::service(service))?
            .remove(service))
    }
}
