//! Execution plans - ordered provider calls plus the changes that justify them

use crate::diff::ChangeSet;
use std::fmt;

/// An ordered list of provider-call descriptors and their change set
///
/// A plan with no steps is a no-op even when its change set is not empty:
/// some fields change as a side effect of another step and must not be
/// triggered on their own.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan<A> {
    steps: Vec<A>,
    changes: ChangeSet,
}

impl<A> Plan<A> {
    /// Create a plan with no steps and no changes
    pub fn noop() -> Self {
        Self {
            steps: Vec::new(),
            changes: ChangeSet::new(),
        }
    }

    /// Create an empty plan justified by `changes`
    pub fn new(changes: ChangeSet) -> Self {
        Self {
            steps: Vec::new(),
            changes,
        }
    }

    /// Append a step, builder style
    pub fn with_step(mut self, step: A) -> Self {
        self.steps.push(step);
        self
    }

    /// Append a step
    pub fn push(&mut self, step: A) {
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[A] {
        &self.steps
    }

    pub fn changes(&self) -> &ChangeSet {
        &self.changes
    }

    pub fn changes_mut(&mut self) -> &mut ChangeSet {
        &mut self.changes
    }

    pub fn into_parts(self) -> (Vec<A>, ChangeSet) {
        (self.steps, self.changes)
    }

    /// Whether no provider call is needed
    pub fn is_noop(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl<A: fmt::Display> Plan<A> {
    /// Human-readable description of each step, for would-do reports
    pub fn describe(&self) -> Vec<String> {
        self.steps.iter().map(ToString::to_string).collect()
    }
}

impl<A> Default for Plan<A> {
    fn default() -> Self {
        Self::noop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_plan() {
        let plan: Plan<String> = Plan::noop();
        assert!(plan.is_noop());
        assert!(plan.changes().is_empty());
    }

    #[test]
    fn test_plan_with_changes_but_no_steps_is_noop() {
        let mut changes = ChangeSet::new();
        changes.record("revision", "12");
        let plan: Plan<String> = Plan::new(changes);
        assert!(plan.is_noop());
        assert!(!plan.changes().is_empty());
    }

    #[test]
    fn test_describe_steps_in_order() {
        let plan = Plan::new(ChangeSet::new())
            .with_step("install hello")
            .with_step("hold hello");
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.describe(), vec!["install hello", "hold hello"]);
    }
}
