//! Core result types for reconciliation

use crate::diff::ChangeSet;
use serde::Serialize;
use std::fmt;

/// Outcome of one reconciliation call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// No diff was found
    Unchanged,
    /// A diff was found, applied and verified clean
    Converged,
    /// Dry run: a diff was found but not applied
    Predicted,
    /// A hard error occurred or verification left a residual diff
    Failed,
}

impl Outcome {
    /// Whether the outcome is not a failure
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed)
    }

    /// Whether something was actually changed
    pub fn is_change(&self) -> bool {
        matches!(self, Self::Converged)
    }

    /// Tri-state result: `None` marks a prediction whose effect is undetermined
    pub fn result(&self) -> Option<bool> {
        match self {
            Self::Unchanged | Self::Converged => Some(true),
            Self::Predicted => None,
            Self::Failed => Some(false),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unchanged => "unchanged",
            Self::Converged => "converged",
            Self::Predicted => "predicted",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uniform result of every public reconciliation operation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateResult {
    pub resource_id: String,
    pub outcome: Outcome,
    pub changes: ChangeSet,
    pub message: String,
}

impl StateResult {
    pub fn new(
        resource_id: impl Into<String>,
        outcome: Outcome,
        changes: ChangeSet,
        message: impl Into<String>,
    ) -> Self {
        Self {
            resource_id: resource_id.into(),
            outcome,
            changes,
            message: message.into(),
        }
    }

    pub fn unchanged(resource_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(resource_id, Outcome::Unchanged, ChangeSet::new(), message)
    }

    pub fn converged(
        resource_id: impl Into<String>,
        changes: ChangeSet,
        message: impl Into<String>,
    ) -> Self {
        Self::new(resource_id, Outcome::Converged, changes, message)
    }

    pub fn predicted(
        resource_id: impl Into<String>,
        changes: ChangeSet,
        message: impl Into<String>,
    ) -> Self {
        Self::new(resource_id, Outcome::Predicted, changes, message)
    }

    pub fn failed(
        resource_id: impl Into<String>,
        changes: ChangeSet,
        message: impl Into<String>,
    ) -> Self {
        Self::new(resource_id, Outcome::Failed, changes, message)
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Outcome counts across several reconciliation calls
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub unchanged: usize,
    pub converged: usize,
    pub predicted: usize,
    pub failed: usize,
}

impl Summary {
    /// Count the outcomes of a batch of results
    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a StateResult>) -> Self {
        let mut summary = Self::default();
        for result in results {
            summary.add(result.outcome);
        }
        summary
    }

    /// Add one outcome to the summary
    pub fn add(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Unchanged => self.unchanged += 1,
            Outcome::Converged => self.converged += 1,
            Outcome::Predicted => self.predicted += 1,
            Outcome::Failed => self.failed += 1,
        }
    }

    /// Merge another summary into this one
    pub fn merge(&mut self, other: &Summary) {
        self.unchanged += other.unchanged;
        self.converged += other.converged;
        self.predicted += other.predicted;
        self.failed += other.failed;
    }

    pub fn total(&self) -> usize {
        self.unchanged + self.converged + self.predicted + self.failed
    }

    /// Check if every call succeeded
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_result_marker() {
        assert_eq!(Outcome::Unchanged.result(), Some(true));
        assert_eq!(Outcome::Converged.result(), Some(true));
        assert_eq!(Outcome::Predicted.result(), None);
        assert_eq!(Outcome::Failed.result(), Some(false));
    }

    #[test]
    fn test_predicted_is_not_a_change() {
        assert!(!Outcome::Predicted.is_change());
        assert!(Outcome::Predicted.is_success());
        assert!(Outcome::Converged.is_change());
    }

    #[test]
    fn test_summary_counts() {
        let results = vec![
            StateResult::unchanged("a", "ok"),
            StateResult::converged("b", ChangeSet::new(), "done"),
            StateResult::failed("c", ChangeSet::new(), "boom"),
            StateResult::predicted("d", ChangeSet::new(), "would"),
        ];
        let summary = Summary::from_results(&results);
        assert_eq!(summary.total(), 4);
        assert_eq!(summary.failed, 1);
        assert!(!summary.is_success());

        let mut merged = Summary::default();
        merged.merge(&summary);
        merged.merge(&summary);
        assert_eq!(merged.converged, 2);
    }

    #[test]
    fn test_state_result_json_shape() {
        let result = StateResult::unchanged("hello", "The snap is already enabled");
        let value: serde_json::Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();
        assert_eq!(value["resource_id"], "hello");
        assert_eq!(value["outcome"], "unchanged");
        assert_eq!(value["changes"], serde_json::json!({}));
    }
}
