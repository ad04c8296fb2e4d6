//! Bounded polling for asynchronous provider effects

use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Default delay between two checks
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// What a wait is waiting for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expectation {
    /// Sub-item being watched (e.g. a service name)
    pub subject: String,
    /// Condition expected to become true (e.g. "running")
    pub condition: String,
    /// Message reported when the budget runs out
    pub failure: String,
}

impl Expectation {
    pub fn new(
        subject: impl Into<String>,
        condition: impl Into<String>,
        failure: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            condition: condition.into(),
            failure: failure.into(),
        }
    }
}

/// An asynchronous effect did not show up within its budget
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{failure}")]
pub struct Timeout {
    pub subject: String,
    pub condition: String,
    pub failure: String,
    pub waited: Duration,
}

/// Wait-until-predicate-or-timeout primitive
///
/// The predicate is checked immediately, then once per interval until it
/// holds or the elapsed wall-clock time reaches the timeout. The only
/// suspension point is the sleep between two checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Poller {
    interval: Duration,
}

impl Poller {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Block until `check` returns `true` or `timeout` elapses
    ///
    /// Errors returned by `check` abort the wait immediately. Running out of
    /// time yields a [`Timeout`] converted into the caller's error type.
    pub fn wait_for<E, F>(
        &self,
        expectation: &Expectation,
        timeout: Duration,
        mut check: F,
    ) -> Result<(), E>
    where
        E: From<Timeout>,
        F: FnMut() -> Result<bool, E>,
    {
        let start = Instant::now();

        while !check()? {
            let waited = start.elapsed();
            if waited >= timeout {
                log::debug!(
                    "{} not {} after {:?}",
                    expectation.subject,
                    expectation.condition,
                    waited
                );
                return Err(Timeout {
                    subject: expectation.subject.clone(),
                    condition: expectation.condition.clone(),
                    failure: expectation.failure.clone(),
                    waited,
                }
                .into());
            }
            thread::sleep(self.interval);
        }

        Ok(())
    }
}

impl Default for Poller {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Debug, PartialEq)]
    enum TestError {
        Timeout(Timeout),
        Check(&'static str),
    }

    impl From<Timeout> for TestError {
        fn from(t: Timeout) -> Self {
            Self::Timeout(t)
        }
    }

    fn expectation() -> Expectation {
        Expectation::new(
            "hello.daemon",
            "running",
            "Tried to start the snap service, but it is still not running",
        )
    }

    #[test]
    fn test_wait_for_immediate_success() {
        let poller = Poller::new(Duration::from_millis(1));
        let calls = Cell::new(0);
        let result: Result<(), TestError> =
            poller.wait_for(&expectation(), Duration::from_millis(50), || {
                calls.set(calls.get() + 1);
                Ok(true)
            });
        assert!(result.is_ok());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_wait_for_eventual_success() {
        let poller = Poller::new(Duration::from_millis(1));
        let calls = Cell::new(0);
        let result: Result<(), TestError> =
            poller.wait_for(&expectation(), Duration::from_secs(5), || {
                calls.set(calls.get() + 1);
                Ok(calls.get() >= 3)
            });
        assert!(result.is_ok());
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_wait_for_timeout_names_subject() {
        let poller = Poller::new(Duration::from_millis(1));
        let result: Result<(), TestError> =
            poller.wait_for(&expectation(), Duration::from_millis(10), || Ok(false));
        match result {
            Err(TestError::Timeout(t)) => {
                assert_eq!(t.subject, "hello.daemon");
                assert_eq!(t.condition, "running");
                assert!(t.waited >= Duration::from_millis(10));
                assert_eq!(
                    t.to_string(),
                    "Tried to start the snap service, but it is still not running"
                );
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn test_wait_for_zero_timeout_checks_once() {
        let poller = Poller::new(Duration::from_secs(60));
        let calls = Cell::new(0);
        let result: Result<(), TestError> = poller.wait_for(&expectation(), Duration::ZERO, || {
            calls.set(calls.get() + 1);
            Ok(false)
        });
        assert!(matches!(result, Err(TestError::Timeout(_))));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_wait_for_check_error_aborts() {
        let poller = Poller::new(Duration::from_millis(1));
        let result = poller.wait_for(&expectation(), Duration::from_secs(5), || {
            Err(TestError::Check("provider unavailable"))
        });
        assert_eq!(result, Err(TestError::Check("provider unavailable")));
    }
}
