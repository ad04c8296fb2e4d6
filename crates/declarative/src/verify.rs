//! Convergence verification - re-diff after apply

use crate::diff::{ChangeSet, DesiredState, ObservedState, diff};
use thiserror::Error;

/// The provider acknowledged an apply, but the state did not follow
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct Verification {
    /// Fields that still differ after the apply
    pub residual: ChangeSet,
    pub message: String,
}

impl Verification {
    /// A verification failure without field-level detail
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            residual: ChangeSet::new(),
            message: message.into(),
        }
    }

    /// A verification failure listing the fields that did not converge
    ///
    /// `done` describes what was attempted, e.g. "Modified the snap".
    pub fn pending(done: &str, residual: ChangeSet) -> Self {
        let message = format!(
            "{done}, but there are still pending changes: {}",
            residual.to_json()
        );
        Self { residual, message }
    }
}

/// Re-observe a resource and diff it against the desired state again
///
/// `observe` must fetch fresh state from the provider; nothing is cached
/// between the apply and this check.
pub fn verify<E, F>(observe: F, desired: &DesiredState) -> Result<ChangeSet, E>
where
    F: FnOnce() -> Result<ObservedState, E>,
{
    let observed = observe()?;
    let residual = diff(&observed, desired);
    if !residual.is_empty() {
        log::warn!(
            "Residual changes after apply: {}",
            residual.keys().collect::<Vec<_>>().join(", ")
        );
    }
    Ok(residual)
}

/// Drop every reported change that the residual shows did not stick
pub fn prune(reported: &mut ChangeSet, residual: &ChangeSet) {
    for key in residual.keys() {
        reported.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::{Desired, FieldChange};
    use serde_json::json;

    fn desired() -> DesiredState {
        [
            ("channel".to_string(), Desired::value("latest/edge")),
            ("held".to_string(), Desired::value(true)),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_verify_clean() {
        let residual = verify(
            || {
                Ok::<_, String>(
                    [
                        ("channel".to_string(), json!("latest/edge")),
                        ("held".to_string(), json!(true)),
                    ]
                    .into_iter()
                    .collect(),
                )
            },
            &desired(),
        )
        .unwrap();
        assert!(residual.is_empty());
    }

    #[test]
    fn test_verify_residual() {
        let residual = verify(
            || {
                Ok::<_, String>(
                    [
                        ("channel".to_string(), json!("latest/stable")),
                        ("held".to_string(), json!(true)),
                    ]
                    .into_iter()
                    .collect(),
                )
            },
            &desired(),
        )
        .unwrap();
        assert_eq!(residual.keys().collect::<Vec<_>>(), vec!["channel"]);
    }

    #[test]
    fn test_verify_propagates_observe_error() {
        let result = verify(|| Err("gone".to_string()), &desired());
        assert_eq!(result, Err("gone".to_string()));
    }

    #[test]
    fn test_prune_removes_unconverged_fields() {
        let mut reported = ChangeSet::new();
        reported.insert_field("channel", FieldChange::modified("a", "b"));
        reported.insert_field("held", FieldChange::modified(false, true));
        let mut residual = ChangeSet::new();
        residual.insert_field("held", FieldChange::modified(false, true));

        prune(&mut reported, &residual);
        assert!(reported.contains("channel"));
        assert!(!reported.contains("held"));
    }

    #[test]
    fn test_pending_message_embeds_residual() {
        let mut residual = ChangeSet::new();
        residual.insert_field("revision", FieldChange::modified("1", "2"));
        let err = Verification::pending("Modified the snap", residual);
        assert_eq!(
            err.to_string(),
            r#"Modified the snap, but there are still pending changes: {"revision":{"old":"1","new":"2"}}"#
        );
    }
}
