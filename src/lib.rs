//! # snapstate
//!
//! Declarative state management for snaps.
//!
//! Each operation on [`Engine`] observes live snapd state through a
//! [`snapkit::Backend`], diffs it against the requested state and either
//! reports the plan (dry run) or applies it, waits for asynchronous
//! effects and verifies the result. Every call returns a
//! [`StateResult`]; failures are reported, never raised.
//!
//! ## Example
//!
//! ```
//! use snapkit::{InstalledSnap, MockBackend, ServiceStatus};
//! use snapstate::{Engine, Outcome};
//!
//! let backend = MockBackend::new();
//! backend
//!     .add_snap(InstalledSnap::new("hello", "latest/stable", "10"))
//!     .add_service("hello", "daemon", ServiceStatus::new(false, false));
//!
//! let engine = Engine::new(backend);
//!
//! let plan = engine.service_running("hello", None, true, &engine.context(true));
//! assert_eq!(plan.outcome, Outcome::Predicted);
//! assert!(engine.backend().calls().is_empty());
//!
//! let done = engine.service_running("hello", None, true, &engine.context(false));
//! assert_eq!(done.outcome, Outcome::Converged);
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod paths;
pub mod report;
pub mod resolver;
pub mod selector;
pub mod states;

pub use config::Config;
pub use engine::{DRY_RUN_WARNING, Engine};
pub use error::{Error, ErrorCategory, Result};
pub use resolver::Target;
pub use selector::ResourceSelector;
pub use states::{InstallRequest, OptionsRequest, WatchedState};

pub use declarative::{ApplyContext, ChangeSet, Outcome, StateResult, Summary};
