//! Error taxonomy for reconciliation
//!
//! Every failure a state operation can hit is one typed variant. Callers
//! branch on [`Error::category`], never on message text.

use declarative::{PartialFailureSet, Timeout, Verification};
use snapkit::ConnectorKind;
use std::path::PathBuf;
use thiserror::Error;

/// Broad classes of reconciliation failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The named resource or sub-resource does not exist
    NotFound,
    /// Connection target resolution found zero or several candidates
    Ambiguous,
    /// The desired state is malformed or self-contradictory
    Validation,
    /// Some sub-items of a fan-out failed
    PartialFailure,
    /// An asynchronous effect did not show up in time
    Timeout,
    /// The provider acknowledged a change that did not stick
    Verification,
    /// The provider rejected or failed a call
    Provider,
}

impl ErrorCategory {
    /// Planning-time problems: dry-run reports them like a real run would
    pub fn is_planning(&self) -> bool {
        matches!(self, Self::NotFound | Self::Ambiguous | Self::Validation)
    }
}

/// Errors raised while reconciling a snap
#[derive(Debug, Error)]
pub enum Error {
    #[error("snap \"{name}\" is not installed")]
    NotInstalled { name: String },

    #[error("Did not find any service to manage")]
    NoServices { selector: String },

    #[error("Specified path '{}' does not exist", path.display())]
    MissingFile { path: PathBuf },

    #[error("Missing assertions, either import them or pass an assertions file")]
    MissingAssertions { sha3_384: String },

    #[error("The snap '{snap}' does not have a plug named '{plug}'")]
    UnknownPlug { snap: String, plug: String },

    #[error("The snap carries neither a slot nor a plug with this name")]
    UnknownConnector { snap: String, connector: String },

    #[error(
        "The target snap '{target}' does not expose exactly one {kind} with interface type '{interface}', but {found}"
    )]
    Ambiguous {
        target: String,
        kind: ConnectorKind,
        interface: String,
        found: usize,
    },

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Timeout(#[from] Timeout),

    #[error(transparent)]
    PartialFailure(#[from] PartialFailureSet),

    #[error(transparent)]
    Verification(#[from] Verification),

    #[error(transparent)]
    Provider(snapkit::Error),
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::NotInstalled { .. }
            | Error::NoServices { .. }
            | Error::MissingFile { .. }
            | Error::MissingAssertions { .. } => ErrorCategory::NotFound,
            Error::UnknownPlug { .. } | Error::UnknownConnector { .. } | Error::Validation(_) => {
                ErrorCategory::Validation
            }
            Error::Ambiguous { .. } => ErrorCategory::Ambiguous,
            Error::Timeout(_) => ErrorCategory::Timeout,
            Error::PartialFailure(_) => ErrorCategory::PartialFailure,
            Error::Verification(_) => ErrorCategory::Verification,
            Error::Provider(err) => match err.category() {
                snapkit::ErrorCategory::NotFound => ErrorCategory::NotFound,
                snapkit::ErrorCategory::Invalid => ErrorCategory::Validation,
                _ => ErrorCategory::Provider,
            },
        }
    }

    /// Whether the error only says that something does not exist yet
    pub fn is_missing(&self) -> bool {
        self.category() == ErrorCategory::NotFound
    }

    /// Shorthand for a post-apply check that found the change missing
    pub fn verification(message: impl Into<String>) -> Self {
        Error::Verification(Verification::new(message))
    }
}

impl From<snapkit::Error> for Error {
    fn from(err: snapkit::Error) -> Self {
        match err {
            snapkit::Error::NotInstalled { name } => Error::NotInstalled { name },
            snapkit::Error::InvalidChannel { .. } | snapkit::Error::InvalidName { .. } => {
                Error::Validation(err.to_string())
            }
            other => Error::Provider(other),
        }
    }
}

/// Result type for reconciliation
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_not_installed_is_typed() {
        let err: Error = snapkit::Error::NotInstalled {
            name: "hello".to_string(),
        }
        .into();
        assert!(matches!(err, Error::NotInstalled { .. }));
        assert!(err.is_missing());
        assert_eq!(err.to_string(), "snap \"hello\" is not installed");
    }

    #[test]
    fn test_invalid_channel_is_validation() {
        let err: Error = snapkit::Channel::parse("a/b/c/d").unwrap_err().into();
        assert_eq!(err.category(), ErrorCategory::Validation);
        assert!(err.category().is_planning());
    }

    #[test]
    fn test_ambiguous_message() {
        let err = Error::Ambiguous {
            target: "core".to_string(),
            kind: ConnectorKind::Slot,
            interface: "network".to_string(),
            found: 2,
        };
        assert_eq!(
            err.to_string(),
            "The target snap 'core' does not expose exactly one slot with interface type 'network', but 2"
        );
        assert_eq!(err.category(), ErrorCategory::Ambiguous);
    }

    #[test]
    fn test_partial_failure_is_not_planning() {
        let mut failures = PartialFailureSet::new();
        failures.record("hello.daemon", "denied");
        let err = Error::from(failures);
        assert_eq!(err.category(), ErrorCategory::PartialFailure);
        assert!(!err.category().is_planning());
        assert_eq!(
            err.to_string(),
            "Encountered some errors:\nhello.daemon: denied"
        );
    }

    #[test]
    fn test_provider_connector_lookup_counts_as_missing() {
        let err: Error = snapkit::Error::NoSuchConnector {
            snap: "hello".to_string(),
            kind: "plug".to_string(),
            name: "home".to_string(),
        }
        .into();
        assert!(err.is_missing());
    }
}
