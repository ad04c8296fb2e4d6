//! `option_managed`: converge snap configuration options

use crate::engine::{Engine, finish, tolerate_missing};
use crate::error::{Error, Result};
use crate::selector::ResourceSelector;
use declarative::{
    ApplyContext, ChangeSet, Desired, DesiredState, StateResult, Verification, diff, fan_out,
    prune, verify,
};
use serde_json::Value;
use snapkit::{Action, Backend};
use std::collections::BTreeMap;

/// Options to manage on one snap
///
/// A value of `None` (or JSON `null`) means the key should be unset.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionsRequest {
    /// One dotted key
    Single { key: String, value: Option<Value> },
    /// Several dotted keys at once
    Batch(BTreeMap<String, Option<Value>>),
}

impl OptionsRequest {
    pub fn single(key: impl Into<String>, value: Option<Value>) -> Self {
        Self::Single {
            key: key.into(),
            value,
        }
    }

    pub fn batch(options: impl IntoIterator<Item = (String, Option<Value>)>) -> Self {
        Self::Batch(options.into_iter().collect())
    }

    /// Build a request from loosely provided arguments
    ///
    /// Exactly one of `option` or `options` must be given. A single option
    /// needs a value; JSON `null` unsets it.
    pub fn from_parts(
        option: Option<String>,
        value: Option<Value>,
        options: Option<BTreeMap<String, Option<Value>>>,
    ) -> Result<Self> {
        match (option, options) {
            (Some(_), Some(_)) => Err(Error::Validation(
                "Either specify option and value or options, not both variants".to_string(),
            )),
            (None, Some(_)) if value.is_some() => Err(Error::Validation(
                "Either specify option and value or options, not both variants".to_string(),
            )),
            (Some(key), None) if value.is_some() => Ok(Self::single(key, value)),
            (None, Some(options)) if !options.is_empty() => Ok(Self::Batch(options)),
            _ => Err(Error::Validation(
                "Either option and value or options are required".to_string(),
            )),
        }
    }

    /// Desired state over the flattened key space
    pub fn desired(&self) -> DesiredState {
        let entry = |key: &String, value: &Option<Value>| {
            let value = value.clone().filter(|value| !value.is_null());
            (key.clone(), Desired::from(value))
        };
        match self {
            Self::Single { key, value } => [entry(key, value)].into(),
            Self::Batch(options) => options.iter().map(|(k, v)| entry(k, v)).collect(),
        }
    }

    fn validate(&self) -> Result<()> {
        let empty = match self {
            Self::Single { key, .. } => key.is_empty(),
            Self::Batch(options) => options.is_empty() || options.keys().any(String::is_empty),
        };
        if empty {
            return Err(Error::Validation(
                "Either option and value or options are required".to_string(),
            ));
        }
        Ok(())
    }
}

/// Provider calls for a diffed option set, unsets first
fn plan_options(snap: &str, changes: &ChangeSet) -> Vec<(String, Action)> {
    let (unsets, sets): (Vec<_>, Vec<_>) = changes.fields().partition(|(_, change)| change.is_unset());
    unsets
        .into_iter()
        .map(|(key, _)| {
            let action = Action::OptionUnset {
                snap: snap.to_string(),
                key: key.to_string(),
            };
            (key.to_string(), action)
        })
        .chain(sets.into_iter().map(|(key, change)| {
            let action = Action::OptionSet {
                snap: snap.to_string(),
                key: key.to_string(),
                value: change.new.clone(),
            };
            (key.to_string(), action)
        }))
        .collect()
}

impl<B: Backend> Engine<B> {
    /// Ensure the requested options hold on `snap`
    pub fn option_managed(
        &self,
        snap: &str,
        request: &OptionsRequest,
        ctx: &ApplyContext,
    ) -> StateResult {
        finish(snap, self.manage_options(snap, request, ctx))
    }

    fn manage_options(
        &self,
        snap: &str,
        request: &OptionsRequest,
        ctx: &ApplyContext,
    ) -> Result<StateResult> {
        ResourceSelector::snap(snap)?;
        request.validate()?;
        let desired = request.desired();

        let observed = match self.backend().options(snap) {
            Ok(observed) => observed,
            Err(err) => return tolerate_missing(ctx, snap, err.into()),
        };
        let changes = diff(&observed, &desired);
        if changes.is_empty() {
            return Ok(StateResult::unchanged(
                snap,
                "All options are in the correct state",
            ));
        }
        log::debug!("{snap}: options to change: {}", changes.to_json());
        if ctx.dry_run {
            return Ok(StateResult::predicted(
                snap,
                changes,
                "Would have modified some options",
            ));
        }

        let mut applied = ChangeSet::new();
        let failures = fan_out(plan_options(snap, &changes), |key, action| -> Result<()> {
            self.apply(&action)?;
            if let Some(change) = changes.field(key) {
                applied.insert_field(key, change.clone());
            }
            Ok(())
        });
        if !failures.is_empty() {
            return Ok(StateResult::failed(snap, applied, failures.to_string()));
        }

        let residual = verify(|| self.backend().options(snap), &desired)?;
        if !residual.is_empty() {
            prune(&mut applied, &residual);
            let failure = Verification::pending("Modified some snap options", residual);
            return Ok(StateResult::failed(snap, applied, failure.to_string()));
        }
        Ok(StateResult::converged(snap, applied, "Modified some options"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::states::testing::{apply_ctx, dry_run_ctx, engine, with_hello};
    use declarative::{ChangeFlag, FieldChange, Outcome};
    use serde_json::json;
    use snapkit::MockBackend;

    fn configured() -> MockBackend {
        let backend = with_hello();
        backend
            .set_option("hello", "server.port", json!(8080))
            .set_option("hello", "debug", json!(true));
        backend
    }

    fn batch(pairs: &[(&str, Option<Value>)]) -> OptionsRequest {
        OptionsRequest::batch(pairs.iter().map(|(k, v)| ((*k).to_string(), v.clone())))
    }

    #[test]
    fn test_from_parts_rejects_both_and_neither() {
        let map: BTreeMap<String, Option<Value>> = [("a".to_string(), Some(json!(1)))].into();

        let both = OptionsRequest::from_parts(Some("a".to_string()), None, Some(map.clone()));
        assert_eq!(
            both.unwrap_err().to_string(),
            "Either specify option and value or options, not both variants"
        );

        let neither = OptionsRequest::from_parts(None, None, None);
        assert_eq!(
            neither.unwrap_err().to_string(),
            "Either option and value or options are required"
        );

        let key_without_value = OptionsRequest::from_parts(Some("a".to_string()), None, None);
        assert_eq!(
            key_without_value.unwrap_err().to_string(),
            "Either option and value or options are required"
        );
        assert_eq!(
            OptionsRequest::from_parts(Some("a".to_string()), Some(Value::Null), None).unwrap(),
            OptionsRequest::single("a", Some(Value::Null))
        );

        assert!(OptionsRequest::from_parts(None, None, Some(BTreeMap::new())).is_err());
        assert_eq!(
            OptionsRequest::from_parts(None, None, Some(map.clone())).unwrap(),
            OptionsRequest::Batch(map)
        );
        assert_eq!(
            OptionsRequest::from_parts(Some("a".to_string()), Some(json!(2)), None).unwrap(),
            OptionsRequest::single("a", Some(json!(2)))
        );
    }

    #[test]
    fn test_null_means_unset() {
        let desired = OptionsRequest::single("a", Some(Value::Null)).desired();
        assert_eq!(desired["a"], Desired::Unset);
    }

    #[test]
    fn test_modify_set_and_unset() {
        let engine = engine(configured());
        let request = batch(&[
            ("server.port", Some(json!(9090))),
            ("debug", None),
            ("name", Some(json!("world"))),
            ("absent", None),
        ]);
        let result = engine.option_managed("hello", &request, &apply_ctx());

        assert_eq!(result.outcome, Outcome::Converged);
        assert_eq!(result.message, "Modified some options");
        assert_eq!(result.changes.len(), 3);
        assert_eq!(
            result.changes.field("server.port"),
            Some(&FieldChange::modified(8080, 9090))
        );
        assert_eq!(
            result.changes.field("debug").and_then(|c| c.flag),
            Some(ChangeFlag::Unset)
        );
        assert_eq!(
            result.changes.field("name").and_then(|c| c.flag),
            Some(ChangeFlag::Set)
        );
        assert!(!result.changes.contains("absent"));

        // Unsets go out before sets
        let kinds: Vec<&str> = engine.backend().calls().iter().map(|a| a.kind()).collect();
        assert_eq!(kinds, vec!["option_unset", "option_set", "option_set"]);

        let again = engine.option_managed("hello", &request, &apply_ctx());
        assert_eq!(again.outcome, Outcome::Unchanged);
        assert_eq!(again.message, "All options are in the correct state");
    }

    #[test]
    fn test_dry_run_predicts_without_calls() {
        let engine = engine(configured());
        let request = OptionsRequest::single("server.port", Some(json!(1)));
        let result = engine.option_managed("hello", &request, &dry_run_ctx());

        assert_eq!(result.outcome, Outcome::Predicted);
        assert_eq!(result.message, "Would have modified some options");
        assert!(result.changes.contains("server.port"));
        assert!(engine.backend().calls().is_empty());
    }

    #[test]
    fn test_failing_key_keeps_other_changes() {
        let backend = configured();
        backend.fail_action("option_set", "hello:name", "read-only");
        let engine = engine(backend);
        let request = batch(&[("name", Some(json!("x"))), ("server.port", Some(json!(1)))]);
        let result = engine.option_managed("hello", &request, &apply_ctx());

        assert_eq!(result.outcome, Outcome::Failed);
        assert!(result.message.starts_with("Encountered some errors:\nname: "));
        assert!(result.changes.contains("server.port"));
        assert!(!result.changes.contains("name"));
    }

    #[test]
    fn test_ignored_set_is_pruned() {
        let backend = configured();
        backend.ignore_action("option_set", "hello:server.port");
        let engine = engine(backend);
        let request = batch(&[("server.port", Some(json!(1))), ("debug", Some(json!(false)))]);
        let result = engine.option_managed("hello", &request, &apply_ctx());

        assert_eq!(result.outcome, Outcome::Failed);
        assert!(
            result
                .message
                .starts_with("Modified some snap options, but there are still pending changes: ")
        );
        assert!(result.message.contains("server.port"));
        assert!(!result.changes.contains("server.port"));
        assert!(result.changes.contains("debug"));
    }

    #[test]
    fn test_missing_snap() {
        let engine = engine(MockBackend::new());
        let request = OptionsRequest::single("a", Some(json!(1)));

        let predicted = engine.option_managed("ghost", &request, &dry_run_ctx());
        assert_eq!(predicted.outcome, Outcome::Predicted);

        let failed = engine.option_managed("ghost", &request, &apply_ctx());
        assert_eq!(failed.outcome, Outcome::Failed);
        assert_eq!(failed.message, "snap \"ghost\" is not installed");
    }
}
