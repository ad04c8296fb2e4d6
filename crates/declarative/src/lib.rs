//! # Declarative
//!
//! A toolkit for converging an externally observed resource toward a
//! declared target state.
//!
//! This crate holds the provider-agnostic half of reconciliation. It never
//! talks to a provider itself: callers fetch observed state, hand it to the
//! diff engine, and pass closures that perform provider calls.
//!
//! ## Core Concepts
//!
//! - **ChangeSet**: field-level differences (`{old, new, flag?}`) plus
//!   whole-resource events such as `installed: <name>`
//! - **Plan**: ordered provider-call descriptors and the change set that
//!   justifies them; a plan without steps is a no-op
//! - **Executor**: applies a plan as one unit, or fans out over independent
//!   sub-items and collects a [`PartialFailureSet`]
//! - **Poller**: bounded wait for asynchronous effects
//! - **Verifier**: re-diffs fresh state after apply and prunes reported
//!   changes that did not stick
//! - **StateResult**: the uniform `{resource_id, outcome, changes, message}`
//!
//! ## Example
//!
//! ```
//! use declarative::{Desired, DesiredState, ObservedState, Outcome, StateResult, diff};
//! use serde_json::json;
//!
//! let observed: ObservedState = [("channel".to_string(), json!("latest/stable"))].into();
//! let desired: DesiredState = [("channel".to_string(), Desired::value("latest/edge"))].into();
//!
//! let changes = diff(&observed, &desired);
//! assert_eq!(changes.len(), 1);
//!
//! let result = StateResult::predicted("hello", changes, "Would have modified the snap");
//! assert_eq!(result.outcome, Outcome::Predicted);
//! ```
//!
//! ## State machine
//!
//! `Start → Diffed → {NoOp | Planned}`, `Planned → {DryRunReported | Applied}`,
//! `Applied → Polled → Verified → {Converged | Failed}`. There is no
//! rollback: a failed call keeps the side effects it already committed.

pub mod context;
pub mod diff;
pub mod executor;
pub mod planner;
pub mod poller;
pub mod types;
pub mod verify;

// Re-export main types at crate root
pub use context::{ApplyContext, DEFAULT_SETTLE_TIMEOUT, DEFAULT_TIMEOUT};
pub use diff::{
    Change, ChangeFlag, ChangeSet, Desired, DesiredState, FieldChange, ObservedState,
    ResourceDiff, diff, diff_resource,
};
pub use executor::{PartialFailureSet, execute, fan_out};
pub use planner::Plan;
pub use poller::{DEFAULT_POLL_INTERVAL, Expectation, Poller, Timeout};
pub use types::{Outcome, StateResult, Summary};
pub use verify::{Verification, prune, verify};
