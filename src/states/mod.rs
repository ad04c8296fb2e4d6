//! State operations, one module per resource kind
//!
//! Each operation returns a [`declarative::StateResult`] and never panics
//! or returns an error: failures end up as `Failed` outcomes with a
//! message.

pub mod connections;
pub mod enablement;
pub mod installed;
pub mod options;
pub mod removed;
pub mod services;
pub mod watch;

pub use installed::InstallRequest;
pub use options::OptionsRequest;
pub use watch::WatchedState;

#[cfg(test)]
pub(crate) mod testing {
    use crate::config::Config;
    use crate::engine::Engine;
    use declarative::ApplyContext;
    use snapkit::{InstalledSnap, MockBackend};
    use std::time::Duration;

    pub(crate) fn init_logging() {
        let _ = env_logger::Builder::new()
            .filter_level(log::LevelFilter::Debug)
            .format_timestamp(None)
            .is_test(true)
            .try_init();
    }

    /// Engine over `backend` with millisecond polling budgets
    pub(crate) fn engine(backend: MockBackend) -> Engine<MockBackend> {
        init_logging();
        let config = Config {
            poll_interval_ms: 1,
            ..Config::default()
        };
        Engine::with_config(backend, config)
    }

    pub(crate) fn apply_ctx() -> ApplyContext {
        ApplyContext::apply()
            .with_timeout(Duration::from_millis(50))
            .with_settle_timeout(Duration::from_millis(20))
            .with_poll_interval(Duration::from_millis(1))
    }

    pub(crate) fn dry_run_ctx() -> ApplyContext {
        ApplyContext::dry_run()
            .with_timeout(Duration::from_millis(50))
            .with_poll_interval(Duration::from_millis(1))
    }

    /// Backend with `hello` (and `core`) installed
    pub(crate) fn with_hello() -> MockBackend {
        let backend = MockBackend::new();
        backend
            .add_snap(InstalledSnap::new("hello", "latest/stable", "10"))
            .add_snap(InstalledSnap::new("core", "latest/stable", "100"));
        backend
    }
}
