//! `removed`: ensure a snap is absent

use crate::engine::{Engine, finish};
use crate::error::{Error, Result};
use crate::selector::ResourceSelector;
use declarative::{ApplyContext, ChangeSet, Plan, StateResult, execute};
use snapkit::{Action, Backend, InstalledSnap};

/// Absence is the no-op condition here, not matching fields
pub(crate) fn plan_remove(current: Option<&InstalledSnap>, purge: bool) -> Plan<Action> {
    let Some(snap) = current else {
        return Plan::noop();
    };
    let mut changes = ChangeSet::new();
    changes.record("removed", snap.name.as_str());
    Plan::new(changes).with_step(Action::Remove {
        name: snap.name.clone(),
        purge,
    })
}

impl<B: Backend> Engine<B> {
    /// Ensure a snap is removed. `purge` skips the data snapshot.
    pub fn removed(&self, name: &str, purge: bool, ctx: &ApplyContext) -> StateResult {
        finish(name, self.ensure_removed(name, purge, ctx))
    }

    fn ensure_removed(&self, name: &str, purge: bool, ctx: &ApplyContext) -> Result<StateResult> {
        ResourceSelector::snap(name)?;
        let current = self.backend().list(name)?;
        let plan = plan_remove(current.as_ref(), purge);
        if plan.is_noop() {
            return Ok(StateResult::unchanged(name, "The snap is already absent"));
        }
        if ctx.dry_run {
            return Ok(StateResult::predicted(
                name,
                plan.changes().clone(),
                "Would have removed the snap",
            ));
        }

        execute(&plan, |action| self.apply(action))?;
        if self.backend().is_installed(name)? {
            return Err(Error::verification(
                "Tried to remove the snap, but it is still present",
            ));
        }
        Ok(StateResult::converged(
            name,
            plan.into_parts().1,
            "Removed the snap",
        ))
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
    fn test_remove_installed_snap() {
        let engine = engine(with_hello());
        let result = engine.removed("hello", true, &apply_ctx());

        assert_eq!(result.outcome, Outcome::Converged);
        assert_eq!(result.message, "Removed the snap");
        assert_eq!(result.changes.event("removed"), Some(&json!("hello")));
        assert_eq!(
            engine.backend().calls(),
            vec![Action::Remove {
                name: "hello".to_string(),
                purge: true
            }]
        );
    }

    #[test]
    fn test_absent_snap_is_unchanged() {
        let engine = engine(MockBackend::new());
        let result = engine.removed("hello", false, &apply_ctx());
        assert_eq!(result.outcome, Outcome::Unchanged);
        assert_eq!(result.message, "The snap is already absent");
        assert!(engine.backend().calls().is_empty());
    }

    #[test]
    fn test_dry_run() {
        let engine = engine(with_hello());
        let result = engine.removed("hello", false, &dry_run_ctx());
        assert_eq!(result.outcome, Outcome::Predicted);
        assert_eq!(result.message, "Would have removed the snap");
        assert!(engine.backend().is_installed("hello").unwrap());
    }

    #[test]
    fn test_remove_without_effect() {
        let backend = with_hello();
        backend.ignore_action("remove", "hello");
        let engine = engine(backend);
        let result = engine.removed("hello", false, &apply_ctx());

        assert_eq!(result.outcome, Outcome::Failed);
        assert_eq!(
            result.message,
            "Tried to remove the snap, but it is still present"
        );
        assert!(result.changes.is_empty());
    }
}
