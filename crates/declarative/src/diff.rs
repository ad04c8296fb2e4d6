//! Diff computation between observed and desired state
//!
//! The diff engine is a pure function over two field maps. It never talks to
//! a provider: callers fetch the observed state and hand it in.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::collections::btree_map;

/// Field values of one resource as reported by the provider
pub type ObservedState = BTreeMap<String, Value>;

/// Target values of one resource as requested by the caller
pub type DesiredState = BTreeMap<String, Desired>;

/// Target value for a single field
#[derive(Debug, Clone, PartialEq)]
pub enum Desired {
    /// The field should hold this value
    Value(Value),
    /// The field should not exist at all
    Unset,
}

impl Desired {
    /// Build a desired value from anything convertible to JSON
    pub fn value(value: impl Into<Value>) -> Self {
        Self::Value(value.into())
    }
}

impl From<Option<Value>> for Desired {
    fn from(value: Option<Value>) -> Self {
        match value {
            Some(v) => Self::Value(v),
            None => Self::Unset,
        }
    }
}

/// Classification for changes to optional-value fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeFlag {
    /// The field did not exist and is being created
    Set,
    /// The field exists and is being removed
    Unset,
}

/// Old and new value of a single field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldChange {
    pub old: Value,
    pub new: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flag: Option<ChangeFlag>,
}

impl FieldChange {
    /// An existing field being overwritten
    pub fn modified(old: impl Into<Value>, new: impl Into<Value>) -> Self {
        Self {
            old: old.into(),
            new: new.into(),
            flag: None,
        }
    }

    /// A missing field being created
    pub fn set(new: impl Into<Value>) -> Self {
        Self {
            old: Value::Null,
            new: new.into(),
            flag: Some(ChangeFlag::Set),
        }
    }

    /// An existing field being removed
    pub fn unset(old: impl Into<Value>) -> Self {
        Self {
            old: old.into(),
            new: Value::Null,
            flag: Some(ChangeFlag::Unset),
        }
    }

    /// Whether this change removes the field
    pub fn is_unset(&self) -> bool {
        self.flag == Some(ChangeFlag::Unset)
    }
}

/// One entry of a [`ChangeSet`]
///
/// Field diffs carry old/new values. Events describe whole-resource effects
/// such as `installed: <name>` or `started: [services]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Change {
    Field(FieldChange),
    Event(Value),
}

impl Change {
    /// The field diff, if this is one
    pub fn as_field(&self) -> Option<&FieldChange> {
        match self {
            Self::Field(change) => Some(change),
            Self::Event(_) => None,
        }
    }
}

/// Structured description of what changed (or would change)
///
/// Keys are kept sorted so that two change sets built from the same inputs
/// compare and serialize identically regardless of insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ChangeSet(BTreeMap<String, Change>);

impl ChangeSet {
    /// Create an empty change set
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, key: &str) -> Option<&Change> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Look up a field diff by key
    pub fn field(&self, key: &str) -> Option<&FieldChange> {
        self.0.get(key).and_then(Change::as_field)
    }

    /// Look up an event value by key
    pub fn event(&self, key: &str) -> Option<&Value> {
        match self.0.get(key) {
            Some(Change::Event(value)) => Some(value),
            _ => None,
        }
    }

    /// Record a field diff
    pub fn insert_field(&mut self, key: impl Into<String>, change: FieldChange) {
        self.0.insert(key.into(), Change::Field(change));
    }

    /// Record an event, replacing any previous value under the same key
    pub fn record(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), Change::Event(value.into()));
    }

    /// Record a list event, skipping it entirely when the list is empty
    pub fn record_list(&mut self, key: impl Into<String>, items: &[String]) {
        if !items.is_empty() {
            self.record(key, items.to_vec());
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, change: Change) {
        self.0.insert(key.into(), change);
    }

    pub fn remove(&mut self, key: &str) -> Option<Change> {
        self.0.remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Change> {
        self.0.iter()
    }

    /// Iterate over field diffs only
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldChange)> {
        self.0
            .iter()
            .filter_map(|(k, c)| c.as_field().map(|f| (k.as_str(), f)))
    }

    /// Merge another change set into this one
    pub fn extend(&mut self, other: ChangeSet) {
        self.0.extend(other.0);
    }

    /// Serialize to a compact JSON string for messages
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{:?}", self.0))
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = (&'a String, &'a Change);
    type IntoIter = btree_map::Iter<'a, String, Change>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<(String, Change)> for ChangeSet {
    fn from_iter<I: IntoIterator<Item = (String, Change)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Result of diffing a resource that may not exist
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceDiff {
    /// The resource does not exist at all
    Missing,
    /// The resource exists; these fields differ (possibly none)
    Changes(ChangeSet),
}

impl ResourceDiff {
    /// Whether the resource already matches the desired state
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Changes(c) if c.is_empty())
    }
}

/// Compute the field-level difference between observed and desired state
///
/// Only fields named in `desired` are considered. Values are compared as
/// opaque JSON; no numeric or version ordering is applied.
pub fn diff(observed: &ObservedState, desired: &DesiredState) -> ChangeSet {
    let mut changes = ChangeSet::new();

    for (field, target) in desired {
        match (observed.get(field), target) {
            // Nothing to unset
            (None, Desired::Unset) => {}
            (None, Desired::Value(new)) => {
                changes.insert_field(field.clone(), FieldChange::set(new.clone()));
            }
            (Some(old), Desired::Unset) => {
                changes.insert_field(field.clone(), FieldChange::unset(old.clone()));
            }
            (Some(old), Desired::Value(new)) if old != new => {
                changes.insert_field(field.clone(), FieldChange::modified(old.clone(), new.clone()));
            }
            (Some(_), Desired::Value(_)) => {}
        }
    }

    changes
}

/// Diff a resource that may be absent
///
/// An absent resource is reported as [`ResourceDiff::Missing`] rather than as
/// "every field differs"; the caller decides whether that is fatal.
pub fn diff_resource(observed: Option<&ObservedState>, desired: &DesiredState) -> ResourceDiff {
    match observed {
        None => ResourceDiff::Missing,
        Some(obs) => ResourceDiff::Changes(diff(obs, desired)),
    }
}
