//! # snapkit
//!
//! Typed model and provider interface for snapd.
//!
//! This crate provides:
//! - Data types for snaps, channels, services, options and plug/slot connections
//! - The [`Action`] descriptor for every mutating snapd call
//! - The [`Backend`] trait the reconciliation layer queries and drives
//! - An in-memory [`MockBackend`] for tests and embedding
//!
//! Parsing `snap` CLI output or the snapd REST payloads is left to
//! backend implementations.
//!
//! ## Example
//!
//! ```
//! use snapkit::{Action, Backend, InstalledSnap, MockBackend};
//!
//! let backend = MockBackend::new();
//! backend.add_snap(InstalledSnap::new("hello", "latest/stable", "10"));
//!
//! backend
//!     .apply(&Action::Disable { name: "hello".to_string() })
//!     .unwrap();
//! assert!(!backend.is_enabled("hello").unwrap());
//! ```

#![warn(clippy::all)]

pub mod backend;
pub mod error;
pub mod types;

pub use backend::Backend;
pub use backend::mock::MockBackend;
pub use error::{Error, ErrorCategory, Result};
pub use types::{
    Action, Channel, Connection, ConnectorInfo, ConnectorKind, Endpoint, InstalledSnap,
    RISK_LEVELS, RevisionSpec, ServiceSelector, ServiceStatus, SnapFileInfo, Upgrade,
};
