//! Apply context threaded through every reconciliation call

use crate::poller::{DEFAULT_POLL_INTERVAL, Poller};
use std::time::Duration;

/// Default budget for an asynchronous effect to show up
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Shortened budget for a second condition on a sub-item that an earlier
/// action in the same plan already drove
pub const DEFAULT_SETTLE_TIMEOUT: Duration = Duration::from_secs(1);

/// Caller-supplied mode and budgets for one reconciliation call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyContext {
    /// Plan only: never call the provider's mutating operations
    pub dry_run: bool,
    /// Budget per polled sub-item
    pub timeout: Duration,
    /// Budget for the follow-up condition on an already-driven sub-item
    pub settle_timeout: Duration,
    /// Delay between two polls
    pub poll_interval: Duration,
}

impl ApplyContext {
    /// Create a context with default budgets
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            timeout: DEFAULT_TIMEOUT,
            settle_timeout: DEFAULT_SETTLE_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Context for a real run
    pub fn apply() -> Self {
        Self::new(false)
    }

    /// Context for a dry run
    pub fn dry_run() -> Self {
        Self::new(true)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_settle_timeout(mut self, settle_timeout: Duration) -> Self {
        self.settle_timeout = settle_timeout;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Poller configured with this context's interval
    pub fn poller(&self) -> Poller {
        Poller::new(self.poll_interval)
    }

    /// Budget for a sub-item, shortened when it was already driven earlier
    pub fn budget(&self, already_driven: bool) -> Duration {
        if already_driven {
            self.settle_timeout.min(self.timeout)
        } else {
            self.timeout
        }
    }
}

impl Default for ApplyContext {
    fn default() -> Self {
        Self::apply()
    }
}
