//! `installed`: install, refresh, pin and hold a snap
//!
//! Store snaps are diffed over `channel`, `revision` and `held`. Local
//! `.snap` files are identified by digest and pinned to the revision
//! their `snap-revision` assertion declares.

use crate::engine::{DRY_RUN_WARNING, Engine, finish, tolerate_missing};
use crate::error::{Error, Result};
use crate::selector::validate_snap_name;
use declarative::{
    ApplyContext, ChangeSet, Desired, DesiredState, ObservedState, Plan, ResourceDiff,
    StateResult, Verification, diff_resource, execute, prune, verify,
};
use serde_json::Value;
use snapkit::{Action, Backend, Channel, InstalledSnap, RevisionSpec};
use std::path::{Path, PathBuf};

/// What `installed` should converge to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRequest {
    /// Snap name, or absolute path to a local `.snap` file
    pub name: String,
    /// Channel to follow; the configured default when `None`
    pub channel: Option<String>,
    /// Revision to pin; once installed, the revision is left alone when `None`
    pub revision: Option<RevisionSpec>,
    /// Install without security confinement
    pub classic: bool,
    /// Exclusion from general refreshes; unmanaged when `None`
    pub held: Option<bool>,
    /// Assertions to import before installing a local snap file
    pub assertions: Option<PathBuf>,
}

impl InstallRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            channel: None,
            revision: None,
            classic: false,
            held: None,
            assertions: None,
        }
    }

    pub fn channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    pub fn revision(mut self, revision: RevisionSpec) -> Self {
        self.revision = Some(revision);
        self
    }

    pub fn classic(mut self, classic: bool) -> Self {
        self.classic = classic;
        self
    }

    pub fn held(mut self, held: bool) -> Self {
        self.held = Some(held);
        self
    }

    pub fn assertions(mut self, path: impl Into<PathBuf>) -> Self {
        self.assertions = Some(path.into());
        self
    }

    /// snapd requires the suffix for local files
    fn is_local(&self) -> bool {
        self.name.ends_with(".snap")
    }
}

/// Fully resolved install target
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct InstallTarget {
    /// Passed to the install call: a snap name or a file path
    pub(crate) source: String,
    pub(crate) snap: String,
    /// Unmanaged for local files
    pub(crate) channel: Option<Channel>,
    pub(crate) revision: Option<String>,
    pub(crate) held: Option<bool>,
    pub(crate) classic: bool,
    pub(crate) local: bool,
}

impl InstallTarget {
    fn desired(&self) -> DesiredState {
        let mut desired = DesiredState::new();
        if let Some(channel) = &self.channel {
            desired.insert("channel".to_string(), Desired::value(channel.as_str()));
        }
        if let Some(revision) = &self.revision {
            desired.insert("revision".to_string(), Desired::value(revision.as_str()));
        }
        if let Some(held) = self.held {
            desired.insert("held".to_string(), Desired::value(held));
        }
        desired
    }

    fn install_action(&self, refresh: bool) -> Action {
        Action::Install {
            name: self.source.clone(),
            channel: self.channel.clone(),
            revision: if self.local {
                None
            } else {
                self.revision.clone()
            },
            classic: self.classic,
            refresh,
        }
    }

    fn hold_action(&self, held: bool) -> Action {
        let name = self.snap.clone();
        if held {
            Action::Hold { name }
        } else {
            Action::Unhold { name }
        }
    }
}

fn observe(snap: &InstalledSnap) -> ObservedState {
    [
        ("channel", Value::from(snap.channel.as_str())),
        ("revision", Value::from(snap.revision.as_str())),
        ("held", Value::from(snap.held)),
    ]
    .into_iter()
    .map(|(field, value)| (field.to_string(), value))
    .collect()
}

/// Plan the provider calls bringing `current` to `target`
///
/// The hold flag is a separate call after the install or refresh.
pub(crate) fn plan_install(current: Option<&InstalledSnap>, target: &InstallTarget) -> Plan<Action> {
    let desired = target.desired();
    let observed = current.map(observe);

    match diff_resource(observed.as_ref(), &desired) {
        ResourceDiff::Missing => {
            let mut changes = ChangeSet::new();
            changes.record("installed", target.source.as_str());
            let mut plan = Plan::new(changes).with_step(target.install_action(false));
            if target.held == Some(true) {
                plan.push(target.hold_action(true));
            }
            plan
        }
        ResourceDiff::Changes(changes) => {
            let mut plan = Plan::new(changes);
            if plan.changes().contains("channel") || plan.changes().contains("revision") {
                plan.push(target.install_action(!target.local));
            }
            if let Some(held) = target.held
                && plan.changes().contains("held")
            {
                plan.push(target.hold_action(held));
            }
            plan
        }
    }
}

/// Resolution of a local snap file
enum LocalTarget {
    Ready(InstallTarget),
    /// Dry run stopped before a target could be determined
    Predicted(StateResult),
}

impl<B: Backend> Engine<B> {
    /// Ensure a snap is installed as requested
    pub fn installed(&self, request: &InstallRequest, ctx: &ApplyContext) -> StateResult {
        finish(&request.name, self.ensure_installed(request, ctx))
    }

    fn ensure_installed(&self, request: &InstallRequest, ctx: &ApplyContext) -> Result<StateResult> {
        let id = request.name.as_str();
        let target = if request.is_local() {
            match self.local_target(request, ctx)? {
                LocalTarget::Ready(target) => target,
                LocalTarget::Predicted(result) => return Ok(result),
            }
        } else {
            self.store_target(request)?
        };

        let current = self.backend().list(&target.snap)?;
        let (verb, done) = match current {
            Some(_) => ("modified", "Modified the snap"),
            None => ("installed", "Installed the snap"),
        };

        let plan = plan_install(current.as_ref(), &target);
        if plan.changes().is_empty() {
            return Ok(StateResult::unchanged(
                id,
                "The snap is already installed as specified",
            ));
        }
        if ctx.dry_run {
            return Ok(StateResult::predicted(
                id,
                plan.changes().clone(),
                format!("Would have {verb} the snap"),
            ));
        }

        execute(&plan, |action| self.apply(action))?;
        let (_, mut changes) = plan.into_parts();

        let residual = verify(
            || {
                self.backend()
                    .list(&target.snap)?
                    .map(|snap| observe(&snap))
                    .ok_or_else(|| {
                        Error::verification(format!("{done}, but it could not be found afterwards"))
                    })
            },
            &target.desired(),
        )?;
        if !residual.is_empty() {
            prune(&mut changes, &residual);
            let failure = Verification::pending(done, residual);
            return Ok(StateResult::failed(id, changes, failure.to_string()));
        }

        Ok(StateResult::converged(id, changes, done))
    }

    fn store_target(&self, request: &InstallRequest) -> Result<InstallTarget> {
        validate_snap_name(&request.name)?;
        let channel = request
            .channel
            .as_deref()
            .unwrap_or(&self.config().default_channel);
        let channel = Channel::parse(channel)?;

        let revision = match &request.revision {
            None => None,
            Some(RevisionSpec::Exact(revision)) => Some(revision.clone()),
            Some(RevisionSpec::Latest) => self.latest_revision(&request.name)?,
        };

        Ok(InstallTarget {
            source: request.name.clone(),
            snap: request.name.clone(),
            channel: Some(channel),
            revision,
            held: request.held,
            classic: request.classic,
            local: false,
        })
    }

    /// Revision of the pending upgrade; `None` when there is nothing to upgrade to
    fn latest_revision(&self, name: &str) -> Result<Option<String>> {
        let upgrade = self.backend().list_upgrades()?.remove(name);
        match &upgrade {
            Some(upgrade) => log::debug!("{name}: latest is revision {}", upgrade.revision),
            None => log::debug!("{name}: no upgrade available"),
        }
        Ok(upgrade.map(|upgrade| upgrade.revision))
    }

    fn local_target(&self, request: &InstallRequest, ctx: &ApplyContext) -> Result<LocalTarget> {
        let id = request.name.as_str();
        let path = Path::new(id);
        if !path.is_absolute() {
            return Err(Error::Validation(format!(
                "Specified path '{id}' is not absolute"
            )));
        }
        if !path.exists() {
            let err = Error::MissingFile {
                path: path.to_path_buf(),
            };
            return tolerate_missing(ctx, id, err).map(LocalTarget::Predicted);
        }

        let info = self.backend().file_info(path)?;
        validate_snap_name(&info.name)?;

        let revision = match self.backend().known_revision(&info.sha3_384)? {
            Some(revision) => revision,
            None if ctx.dry_run => {
                let mut changes = ChangeSet::new();
                let message = if request.assertions.is_some() {
                    changes.record("installed", id);
                    "Would have imported assertions and installed the snap".to_string()
                } else {
                    let err = Error::MissingAssertions {
                        sha3_384: info.sha3_384,
                    };
                    format!("{err}{DRY_RUN_WARNING}")
                };
                return Ok(LocalTarget::Predicted(StateResult::predicted(
                    id, changes, message,
                )));
            }
            None => self.import_assertions(request, &info.sha3_384)?,
        };

        Ok(LocalTarget::Ready(InstallTarget {
            source: id.to_string(),
            snap: info.name,
            channel: None,
            revision: Some(revision),
            held: None,
            classic: request.classic,
            local: true,
        }))
    }

    fn import_assertions(&self, request: &InstallRequest, sha3_384: &str) -> Result<String> {
        let Some(path) = &request.assertions else {
            return Err(Error::MissingAssertions {
                sha3_384: sha3_384.to_string(),
            });
        };
        self.apply(&Action::Ack { path: path.clone() })?;
        self.backend()
            .known_revision(sha3_384)?
            .ok_or_else(|| {
                Error::verification("Imported assertions, but still could not find snap-revision")
            })
    }
}
