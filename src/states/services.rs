//! `service_running` / `service_dead`: drive snap services
//!
//! Each service has two independent axes, running and enabled. Services
//! are driven one by one; a failing service does not stop the others and
//! the ones that converged stay reported.

use crate::engine::{Engine, finish, tolerate_missing};
use crate::error::{Error, Result};
use crate::selector::ResourceSelector;
use declarative::{ApplyContext, ChangeSet, Expectation, StateResult, fan_out};
use snapkit::{Action, Backend, ServiceSelector, ServiceStatus};
use std::collections::{BTreeMap, BTreeSet};

/// Services that need to move on each axis
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ServicePlan {
    /// Not yet at the desired running state
    pub(crate) drive: Vec<String>,
    /// Not yet at the desired boot state
    pub(crate) toggle: Vec<String>,
}

impl ServicePlan {
    pub(crate) fn is_noop(&self) -> bool {
        self.drive.is_empty() && self.toggle.is_empty()
    }

    /// Every service needing a call, each once, in name order
    pub(crate) fn services(&self) -> BTreeSet<String> {
        self.drive.iter().chain(&self.toggle).cloned().collect()
    }
}

/// Compare service status against the desired axes
///
/// `enabled` of `None` leaves the boot state unmanaged.
pub(crate) fn plan_services(
    statuses: &BTreeMap<String, ServiceStatus>,
    running: bool,
    enabled: Option<bool>,
) -> ServicePlan {
    let mut plan = ServicePlan::default();
    for (name, status) in statuses {
        if status.running != running {
            plan.drive.push(name.clone());
        }
        if enabled.is_some_and(|enabled| status.enabled != enabled) {
            plan.toggle.push(name.clone());
        }
    }
    plan
}

/// Wording for one direction
struct Direction {
    running: bool,
    drive_key: &'static str,
    toggle_key: &'static str,
    planned: &'static str,
    done: &'static str,
    drive_failure: &'static str,
    toggle_failure: &'static str,
}

const START: Direction = Direction {
    running: true,
    drive_key: "started",
    toggle_key: "enabled",
    planned: "Would have started/enabled some services",
    done: "Started/enabled some services",
    drive_failure: "Tried to start the snap service, but it is still not running",
    toggle_failure: "Tried to enable the snap service, but it is still not enabled",
};

const STOP: Direction = Direction {
    running: false,
    drive_key: "stopped",
    toggle_key: "disabled",
    planned: "Would have stopped/disabled some services",
    done: "Stopped/disabled some services",
    drive_failure: "Tried to stop the snap service, but it is still running",
    toggle_failure: "Tried to disable the snap service, but it is still enabled",
};

impl<B: Backend> Engine<B> {
    /// Ensure services are running, and with `enable` also started at boot
    ///
    /// Without `service`, every service of the snap is managed.
    pub fn service_running(
        &self,
        snap: &str,
        service: Option<&str>,
        enable: bool,
        ctx: &ApplyContext,
    ) -> StateResult {
        let id = resource_id(snap, service);
        finish(&id, self.ensure_services(&id, snap, service, &START, enable, ctx))
    }

    /// Ensure services are stopped, and with `disable` also not started at boot
    pub fn service_dead(
        &self,
        snap: &str,
        service: Option<&str>,
        disable: bool,
        ctx: &ApplyContext,
    ) -> StateResult {
        let id = resource_id(snap, service);
        finish(&id, self.ensure_services(&id, snap, service, &STOP, disable, ctx))
    }

    /// Status of the selected services; an empty listing is an error
    pub(crate) fn list_services(
        &self,
        snap: &str,
        service: Option<&str>,
    ) -> Result<BTreeMap<String, ServiceStatus>> {
        ResourceSelector::service(snap, service)?;
        let selector = ServiceSelector::for_snap(snap, service);
        let statuses = self.backend().services(&selector)?;
        if statuses.is_empty() {
            return Err(Error::NoServices {
                selector: selector.to_string(),
            });
        }
        Ok(statuses)
    }

    /// Block until `service` reports the expected running or boot state
    pub(crate) fn wait_for_service(
        &self,
        ctx: &ApplyContext,
        service: &str,
        expectation: &Expectation,
        timeout: std::time::Duration,
        check: impl Fn(&ServiceStatus) -> bool,
    ) -> Result<()> {
        ctx.poller().wait_for(expectation, timeout, || {
            Ok(self
                .backend()
                .service_status(service)?
                .is_some_and(|status| check(&status)))
        })
    }

    fn ensure_services(
        &self,
        id: &str,
        snap: &str,
        service: Option<&str>,
        direction: &Direction,
        boot: bool,
        ctx: &ApplyContext,
    ) -> Result<StateResult> {
        let statuses = match self.list_services(snap, service) {
            Ok(statuses) => statuses,
            Err(err) => return tolerate_missing(ctx, id, err),
        };

        let want_enabled = boot.then_some(direction.running);
        let plan = plan_services(&statuses, direction.running, want_enabled);
        if plan.is_noop() {
            return Ok(StateResult::unchanged(
                id,
                "All services are in the correct state",
            ));
        }
        if ctx.dry_run {
            let mut changes = ChangeSet::new();
            changes.record_list(direction.drive_key, &plan.drive);
            changes.record_list(direction.toggle_key, &plan.toggle);
            return Ok(StateResult::predicted(id, changes, direction.planned));
        }

        let mut driven = Vec::new();
        let mut toggled = Vec::new();
        let items = plan.services().into_iter().map(|name| (name, ()));
        let failures = fan_out(items, |name, ()| -> Result<()> {
            let action = if direction.running {
                Action::ServiceStart {
                    service: name.to_string(),
                    enable: boot,
                }
            } else {
                Action::ServiceStop {
                    service: name.to_string(),
                    disable: boot,
                }
            };
            self.apply(&action)?;

            let drive = plan.drive.iter().any(|s| s == name);
            if drive {
                let expectation = Expectation::new(
                    name,
                    if direction.running { "running" } else { "stopped" },
                    direction.drive_failure,
                );
                self.wait_for_service(ctx, name, &expectation, ctx.timeout, |status| {
                    status.running == direction.running
                })?;
                driven.push(name.to_string());
            }
            if plan.toggle.iter().any(|s| s == name) {
                let expectation = Expectation::new(
                    name,
                    if direction.running { "enabled" } else { "disabled" },
                    direction.toggle_failure,
                );
                self.wait_for_service(ctx, name, &expectation, ctx.budget(drive), |status| {
                    status.enabled == direction.running
                })?;
                toggled.push(name.to_string());
            }
            Ok(())
        });

        let mut changes = ChangeSet::new();
        changes.record_list(direction.drive_key, &driven);
        changes.record_list(direction.toggle_key, &toggled);

        if !failures.is_empty() {
            return Ok(StateResult::failed(id, changes, failures.to_string()));
        }
        Ok(StateResult::converged(id, changes, direction.done))
    }
}

fn resource_id(snap: &str, service: Option<&str>) -> String {
    match service {
        Some(service) => format!("{snap}.{service}"),
        None => snap.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::states::testing::{apply_ctx, dry_run_ctx, engine, with_hello};
    use declarative::Outcome;
    use serde_json::json;
    use snapkit::MockBackend;

    fn three_services() -> MockBackend {
        let backend = with_hello();
        for app in ["a", "b", "c"] {
            backend.add_service("hello", app, ServiceStatus::new(false, false));
        }
        backend
    }

    #[test]
    fn test_start_all_services() {
        let engine = engine(three_services());
        let result = engine.service_running("hello", None, true, &apply_ctx());

        assert_eq!(result.outcome, Outcome::Converged);
        assert_eq!(result.message, "Started/enabled some services");
        assert_eq!(
            serde_json::to_value(&result.changes).unwrap(),
            json!({
                "started": ["hello.a", "hello.b", "hello.c"],
                "enabled": ["hello.a", "hello.b", "hello.c"],
            })
        );
        assert_eq!(engine.backend().calls().len(), 3);

        let again = engine.service_running("hello", None, true, &apply_ctx());
        assert_eq!(again.outcome, Outcome::Unchanged);
        assert_eq!(again.message, "All services are in the correct state");
    }

    #[test]
    fn test_one_failing_service_is_attributed() {
        let backend = three_services();
        backend.fail_action("service_start", "hello.b", "unit failed");
        let engine = engine(backend);
        let result = engine.service_running("hello", None, false, &apply_ctx());

        assert_eq!(result.outcome, Outcome::Failed);
        assert_eq!(
            result.changes.event("started"),
            Some(&json!(["hello.a", "hello.c"]))
        );
        assert!(!result.changes.contains("enabled"));
        assert!(result.message.starts_with("Encountered some errors:\nhello.b: "));
        assert!(result.message.contains("unit failed"));
    }

    #[test]
    fn test_single_service_selector() {
        let engine = engine(three_services());
        let result = engine.service_running("hello", Some("b"), false, &apply_ctx());

        assert_eq!(result.resource_id, "hello.b");
        assert_eq!(result.changes.event("started"), Some(&json!(["hello.b"])));
        assert!(!result.changes.contains("enabled"));
    }

    #[test]
    fn test_dry_run_lists_both_axes() {
        let backend = with_hello();
        backend
            .add_service("hello", "a", ServiceStatus::new(false, true))
            .add_service("hello", "b", ServiceStatus::new(true, false));
        let engine = engine(backend);
        let result = engine.service_dead("hello", None, true, &dry_run_ctx());

        assert_eq!(result.outcome, Outcome::Predicted);
        assert_eq!(result.message, "Would have stopped/disabled some services");
        assert_eq!(result.changes.event("stopped"), Some(&json!(["hello.a"])));
        assert_eq!(result.changes.event("disabled"), Some(&json!(["hello.b"])));
        assert!(engine.backend().calls().is_empty());
    }

    #[test]
    fn test_stop_and_disable() {
        let backend = with_hello();
        backend.add_service("hello", "daemon", ServiceStatus::new(true, true));
        let engine = engine(backend);
        let result = engine.service_dead("hello", None, true, &apply_ctx());

        assert_eq!(result.outcome, Outcome::Converged);
        assert_eq!(result.message, "Stopped/disabled some services");
        assert_eq!(
            engine.backend().service_status("hello.daemon").unwrap(),
            Some(ServiceStatus::new(false, false))
        );
    }

    #[test]
    fn test_delayed_transition_is_polled() {
        let backend = three_services();
        backend.set_service_delay(3);
        let engine = engine(backend);
        let result = engine.service_running("hello", Some("a"), false, &apply_ctx());
        assert_eq!(result.outcome, Outcome::Converged);
    }

    #[test]
    fn test_transition_that_never_happens_times_out() {
        let backend = three_services();
        backend.ignore_action("service_start", "hello.a");
        let engine = engine(backend);
        let result = engine.service_running("hello", Some("a"), false, &apply_ctx());

        assert_eq!(result.outcome, Outcome::Failed);
        assert_eq!(
            result.message,
            "Encountered some errors:\nhello.a: Tried to start the snap service, but it is still not running"
        );
        assert!(result.changes.is_empty());
    }

    #[test]
    fn test_no_services() {
        let engine = engine(with_hello());

        let predicted = engine.service_running("hello", None, false, &dry_run_ctx());
        assert_eq!(predicted.outcome, Outcome::Predicted);
        assert!(
            predicted
                .message
                .starts_with("Did not find any service to manage")
        );

        let failed = engine.service_running("hello", None, false, &apply_ctx());
        assert_eq!(failed.outcome, Outcome::Failed);
        assert_eq!(failed.message, "Did not find any service to manage");
    }

    #[test]
    fn test_plan_services_axes_are_independent() {
        let statuses: BTreeMap<String, ServiceStatus> = [
            ("s.a".to_string(), ServiceStatus::new(true, false)),
            ("s.b".to_string(), ServiceStatus::new(false, true)),
        ]
        .into();
        let plan = plan_services(&statuses, true, Some(true));
        assert_eq!(plan.drive, vec!["s.a".to_string()]);
        assert_eq!(plan.toggle, vec!["s.b".to_string()]);
        assert_eq!(plan.services().len(), 2);

        assert!(plan_services(&statuses, true, None).toggle.is_empty());
    }
}
