//! `enabled` / `disabled`: toggle whether a snap is active

use crate::engine::{Engine, finish, tolerate_missing};
use crate::error::{Error, Result};
use crate::selector::ResourceSelector;
use declarative::{ApplyContext, ChangeSet, Plan, StateResult, execute};
use snapkit::{Action, Backend};

const fn word(enable: bool) -> &'static str {
    if enable { "enabled" } else { "disabled" }
}

/// Empty unless the snap is on the other side of the toggle
pub(crate) fn plan_toggle(name: &str, current: bool, enable: bool) -> Plan<Action> {
    if current == enable {
        return Plan::noop();
    }
    let mut changes = ChangeSet::new();
    changes.record(word(enable), name);
    let name = name.to_string();
    Plan::new(changes).with_step(if enable {
        Action::Enable { name }
    } else {
        Action::Disable { name }
    })
}

impl<B: Backend> Engine<B> {
    /// Ensure a snap is enabled
    pub fn enabled(&self, name: &str, ctx: &ApplyContext) -> StateResult {
        finish(name, self.ensure_toggled(name, true, ctx))
    }

    /// Ensure a snap is disabled
    pub fn disabled(&self, name: &str, ctx: &ApplyContext) -> StateResult {
        finish(name, self.ensure_toggled(name, false, ctx))
    }

    fn ensure_toggled(&self, name: &str, enable: bool, ctx: &ApplyContext) -> Result<StateResult> {
        ResourceSelector::snap(name)?;
        let (verb, done) = if enable {
            ("enable", "Enabled the snap")
        } else {
            ("disable", "Disabled the snap")
        };

        let current = match self.backend().is_enabled(name) {
            Ok(current) => current,
            Err(err) => return tolerate_missing(ctx, name, err.into()),
        };
        let plan = plan_toggle(name, current, enable);
        if plan.is_noop() {
            return Ok(StateResult::unchanged(
                name,
                format!("The snap is already {}", word(enable)),
            ));
        }
        if ctx.dry_run {
            return Ok(StateResult::predicted(
                name,
                plan.changes().clone(),
                format!("Would have {verb}d the snap"),
            ));
        }

        execute(&plan, |action| self.apply(action))?;
        if self.backend().is_enabled(name)? != enable {
            return Err(Error::verification(format!(
                "Tried to {verb} the snap, but it is still {}",
                word(!enable)
            )));
        }
        Ok(StateResult::converged(name, plan.into_parts().1, done))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::states::testing::{apply_ctx, dry_run_ctx, engine, with_hello};
    use declarative::Outcome;
    use serde_json::json;
    use snapkit::MockBackend;

    #[test]
    fn test_disable_then_enable() {
        let engine = engine(with_hello());

        let disabled = engine.disabled("hello", &apply_ctx());
        assert_eq!(disabled.outcome, Outcome::Converged);
        assert_eq!(disabled.message, "Disabled the snap");
        assert_eq!(disabled.changes.event("disabled"), Some(&json!("hello")));
        assert!(!engine.backend().is_enabled("hello").unwrap());

        let enabled = engine.enabled("hello", &apply_ctx());
        assert_eq!(enabled.outcome, Outcome::Converged);
        assert_eq!(enabled.changes.event("enabled"), Some(&json!("hello")));
    }

    #[test]
    fn test_already_enabled() {
        let engine = engine(with_hello());
        let result = engine.enabled("hello", &apply_ctx());
        assert_eq!(result.outcome, Outcome::Unchanged);
        assert_eq!(result.message, "The snap is already enabled");
        assert!(engine.backend().calls().is_empty());
    }

    #[test]
    fn test_dry_run() {
        let engine = engine(with_hello());
        let result = engine.disabled("hello", &dry_run_ctx());
        assert_eq!(result.outcome, Outcome::Predicted);
        assert_eq!(result.message, "Would have disabled the snap");
        assert!(engine.backend().calls().is_empty());
    }

    #[test]
    fn test_missing_snap() {
        let engine = engine(MockBackend::new());

        let predicted = engine.enabled("hello", &dry_run_ctx());
        assert_eq!(predicted.outcome, Outcome::Predicted);
        assert!(predicted.message.starts_with("snap \"hello\" is not installed"));

        let failed = engine.enabled("hello", &apply_ctx());
        assert_eq!(failed.outcome, Outcome::Failed);
        assert_eq!(failed.message, "snap \"hello\" is not installed");
    }

    #[test]
    fn test_toggle_without_effect() {
        let backend = with_hello();
        backend.ignore_action("disable", "hello");
        let engine = engine(backend);
        let result = engine.disabled("hello", &apply_ctx());

        assert_eq!(result.outcome, Outcome::Failed);
        assert_eq!(
            result.message,
            "Tried to disable the snap, but it is still enabled"
        );
    }

    #[test]
    fn test_plan_toggle() {
        assert!(plan_toggle("hello", true, true).is_noop());
        let plan = plan_toggle("hello", true, false);
        assert_eq!(
            plan.steps(),
            &[Action::Disable {
                name: "hello".to_string()
            }]
        );
    }
}
