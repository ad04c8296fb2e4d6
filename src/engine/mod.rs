//! Reconciliation engine for snapstate
//!
//! The engine owns a [`Backend`] and drives every state operation:
//! 1. Observing - query live state (nothing is cached between calls)
//! 2. Planning - diff against the desired state, build provider calls
//! 3. Executing - apply the plan, or report it when dry-running
//! 4. Verifying - poll asynchronous effects and re-diff fresh state
//!
//! Operations are implemented in [`crate::states`], one module per
//! resource kind, as `impl<B: Backend> Engine<B>` blocks.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::resolver::Resolver;
use declarative::{ApplyContext, ChangeSet, StateResult};
use snapkit::{Action, Backend};

/// Suffix for planning errors reported as predictions in dry-run mode
pub const DRY_RUN_WARNING: &str = " - if we weren't testing, this would be an error";

/// Drives snaps toward declared states through a [`Backend`]
pub struct Engine<B: Backend> {
    backend: B,
    config: Config,
}

impl<B: Backend> Engine<B> {
    /// Create an engine with the default configuration
    pub fn new(backend: B) -> Self {
        Self::with_config(backend, Config::default())
    }

    pub fn with_config(backend: B, config: Config) -> Self {
        Self { backend, config }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Apply context with the configured budgets
    pub fn context(&self, dry_run: bool) -> ApplyContext {
        self.config.context(dry_run)
    }

    pub(crate) fn resolver(&self) -> Resolver<'_, B> {
        Resolver::new(&self.backend, &self.config.base_snap)
    }

    /// Perform one provider call
    pub(crate) fn apply(&self, action: &Action) -> Result<()> {
        log::info!("Applying: {action}");
        self.backend.apply(action)?;
        Ok(())
    }
}

/// Turn the outcome of an operation body into its final result
///
/// Hard errors become `Failed` with no changes: a failed call reports
/// nothing as changed unless the operation recorded partial progress
/// itself.
pub(crate) fn finish(resource_id: &str, result: Result<StateResult>) -> StateResult {
    match result {
        Ok(result) => {
            log::debug!("{resource_id}: {} ({})", result.outcome, result.message);
            result
        }
        Err(err) => {
            log::warn!("{resource_id}: {err}");
            StateResult::failed(resource_id, ChangeSet::new(), err.to_string())
        }
    }
}

/// Report a missing resource as a prediction when dry-running
///
/// Outside dry-run, or for anything but a missing resource, the error is
/// returned unchanged.
pub(crate) fn tolerate_missing(
    ctx: &ApplyContext,
    resource_id: &str,
    err: Error,
) -> Result<StateResult> {
    if !(ctx.dry_run && err.is_missing()) {
        return Err(err);
    }
    log::warn!("{resource_id}: {err} (dry run)");
    Ok(StateResult::predicted(
        resource_id,
        ChangeSet::new(),
        format!("{err}{DRY_RUN_WARNING}"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::Outcome;
    use snapkit::MockBackend;

    #[test]
    fn test_finish_maps_errors_to_failed() {
        let result = finish(
            "hello",
            Err(Error::NotInstalled {
                name: "hello".to_string(),
            }),
        );
        assert_eq!(result.outcome, Outcome::Failed);
        assert!(result.changes.is_empty());
        assert_eq!(result.message, "snap \"hello\" is not installed");
    }

    #[test]
    fn test_tolerate_missing_only_in_dry_run() {
        let missing = || Error::NotInstalled {
            name: "hello".to_string(),
        };

        let predicted = tolerate_missing(&ApplyContext::dry_run(), "hello", missing()).unwrap();
        assert_eq!(predicted.outcome, Outcome::Predicted);
        assert_eq!(
            predicted.message,
            "snap \"hello\" is not installed - if we weren't testing, this would be an error"
        );

        assert!(tolerate_missing(&ApplyContext::apply(), "hello", missing()).is_err());
    }

    #[test]
    fn test_tolerate_missing_keeps_planning_errors() {
        let err = Error::Validation("bad".to_string());
        assert!(tolerate_missing(&ApplyContext::dry_run(), "hello", err).is_err());
    }

    #[test]
    fn test_context_uses_config() {
        let config = Config {
            default_timeout_secs: 3,
            ..Config::default()
        };
        let engine = Engine::with_config(MockBackend::new(), config);
        assert_eq!(engine.context(false).timeout.as_secs(), 3);
        assert_eq!(engine.config().base_snap, "core");
    }
}
