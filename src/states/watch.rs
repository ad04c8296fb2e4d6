//! `watch_triggered`: react to a change in something a service watches

use crate::engine::{Engine, finish, tolerate_missing};
use crate::error::Result;
use declarative::{ApplyContext, ChangeSet, Expectation, StateResult, fan_out};
use snapkit::{Action, Backend, ServiceStatus};
use std::collections::BTreeMap;
use std::fmt;

/// State the watched services should be brought into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchedState {
    /// Restart what runs, start what does not
    Running,
    /// Stop what runs
    Dead,
}

impl fmt::Display for WatchedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Running => "running",
            Self::Dead => "dead",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verb {
    Start,
    Restart,
    Reload,
    Stop,
}

impl Verb {
    fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Restart => "restart",
            Self::Reload => "reload",
            Self::Stop => "stop",
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Start => "started",
            Self::Restart => "restarted",
            Self::Reload => "reloaded",
            Self::Stop => "stopped",
        }
    }

    fn running(self) -> bool {
        !matches!(self, Self::Stop)
    }

    fn action(self, service: &str) -> Action {
        let service = service.to_string();
        match self {
            Self::Start => Action::ServiceStart {
                service,
                enable: false,
            },
            Self::Restart | Self::Reload => Action::ServiceRestart {
                service,
                reload: self == Self::Reload,
            },
            Self::Stop => Action::ServiceStop {
                service,
                disable: false,
            },
        }
    }
}

/// Pick a verb for every service; services already in place for `Dead`
/// are skipped
fn plan_watch(
    statuses: &BTreeMap<String, ServiceStatus>,
    state: WatchedState,
    reload: bool,
) -> BTreeMap<String, Verb> {
    statuses
        .iter()
        .filter_map(|(name, status)| {
            let verb = match (state, status.running) {
                (WatchedState::Dead, true) => Verb::Stop,
                (WatchedState::Dead, false) => return None,
                (WatchedState::Running, true) if reload => Verb::Reload,
                (WatchedState::Running, true) => Verb::Restart,
                (WatchedState::Running, false) => Verb::Start,
            };
            Some((name.clone(), verb))
        })
        .collect()
}

fn record(plan: &BTreeMap<String, Verb>) -> ChangeSet {
    let mut changes = ChangeSet::new();
    for verb in [Verb::Stop, Verb::Restart, Verb::Reload, Verb::Start] {
        let items: Vec<String> = plan
            .iter()
            .filter(|(_, v)| **v == verb)
            .map(|(name, _)| name.clone())
            .collect();
        changes.record_list(verb.key(), &items);
    }
    changes
}

impl<B: Backend> Engine<B> {
    /// Restart or stop a snap's services after a watched resource changed
    ///
    /// Unlike [`Engine::service_running`], `Running` always acts: services
    /// that already run are restarted (or reloaded).
    pub fn watch_triggered(
        &self,
        snap: &str,
        state: WatchedState,
        service: Option<&str>,
        reload: bool,
        ctx: &ApplyContext,
    ) -> StateResult {
        let id = match service {
            Some(service) => format!("{snap}.{service}"),
            None => snap.to_string(),
        };
        finish(&id, self.trigger(&id, snap, state, service, reload, ctx))
    }

    fn trigger(
        &self,
        id: &str,
        snap: &str,
        state: WatchedState,
        service: Option<&str>,
        reload: bool,
        ctx: &ApplyContext,
    ) -> Result<StateResult> {
        let statuses = match self.list_services(snap, service) {
            Ok(statuses) => statuses,
            Err(err) => return tolerate_missing(ctx, id, err),
        };

        let plan = plan_watch(&statuses, state, reload);
        if plan.is_empty() {
            return Ok(StateResult::unchanged(
                id,
                "All snap services are already stopped.",
            ));
        }
        log::debug!("{id}: watch triggered, bringing {} services {state}", plan.len());
        if ctx.dry_run {
            let message = match state {
                WatchedState::Dead => "Would have stopped some services.",
                WatchedState::Running => "Would have (re)started some services.",
            };
            return Ok(StateResult::predicted(id, record(&plan), message));
        }

        let mut done = BTreeMap::new();
        let failures = fan_out(plan.clone(), |name, verb| -> Result<()> {
            self.apply(&verb.action(name))?;
            let condition = if verb.running() { "running" } else { "dead" };
            let expectation = Expectation::new(
                name,
                condition,
                format!(
                    "Tried to {} the snap service, but it is still not {condition}.",
                    verb.as_str()
                ),
            );
            self.wait_for_service(ctx, name, &expectation, ctx.timeout, |status| {
                status.running == verb.running()
            })?;
            done.insert(name.to_string(), verb);
            Ok(())
        });

        let changes = record(&done);
        if !failures.is_empty() {
            return Ok(StateResult::failed(id, changes, failures.to_string()));
        }
        let message = match state {
            WatchedState::Dead => "Stopped some services",
            WatchedState::Running => "(Re)started some services",
        };
        Ok(StateResult::converged(id, changes, message))
    }
}
