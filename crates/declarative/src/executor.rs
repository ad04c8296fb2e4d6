//! Execution engine - applies plan steps sequentially
//!
//! Two modes exist. [`execute`] treats the plan as one unit and stops at the
//! first error. [`fan_out`] applies independent sub-items one after another,
//! recording each failure without aborting the rest.
//!
//! There is no parallelism: ordering of side effects is deterministic and
//! failure attribution is per item.

use crate::planner::Plan;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Apply every step of a plan in order
///
/// Returns the number of steps applied. Any error is fatal for the plan and
/// is returned as-is.
pub fn execute<A, E, F>(plan: &Plan<A>, mut apply: F) -> Result<usize, E>
where
    A: fmt::Debug,
    F: FnMut(&A) -> Result<(), E>,
{
    for step in plan.steps() {
        log::debug!("Applying {step:?}");
        apply(step)?;
    }
    Ok(plan.len())
}

/// Errors collected while fanning out over independent sub-items
///
/// Keys are sub-item identifiers (a service, an option key, a peer
/// endpoint); values are the error messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PartialFailureSet {
    failures: BTreeMap<String, String>,
}

impl PartialFailureSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure for a sub-item
    pub fn record(&mut self, item: impl Into<String>, error: impl fmt::Display) {
        self.failures.insert(item.into(), error.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn get(&self, item: &str) -> Option<&str> {
        self.failures.get(item).map(String::as_str)
    }

    pub fn contains(&self, item: &str) -> bool {
        self.failures.contains_key(item)
    }

    /// Identifiers of the failed sub-items
    pub fn items(&self) -> impl Iterator<Item = &str> {
        self.failures.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.failures.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// `Ok(())` when nothing failed, otherwise the set itself as an error
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for PartialFailureSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Encountered some errors:")?;
        for (item, error) in &self.failures {
            write!(f, "\n{item}: {error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for PartialFailureSet {}

/// Apply `apply` to every sub-item, collecting failures instead of aborting
///
/// Items are processed in iteration order. Successful items are the
/// caller's to record (typically inside `apply`); this function only keeps
/// track of what failed.
pub fn fan_out<T, E, F>(items: impl IntoIterator<Item = (String, T)>, mut apply: F) -> PartialFailureSet
where
    E: fmt::Display,
    F: FnMut(&str, T) -> Result<(), E>,
{
    let mut failures = PartialFailureSet::new();

    for (id, item) in items {
        match apply(&id, item) {
            Ok(()) => log::debug!("Applied {id}"),
            Err(e) => {
                log::warn!("Failed to apply {id}: {e}");
                failures.record(id, e);
            }
        }
    }

    failures
}
