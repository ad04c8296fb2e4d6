//! Error types for snapd operations.
//!
//! Errors are categorized so callers can tell a missing snap from a bad
//! request or a failed command without inspecting message text.

use std::path::PathBuf;
use thiserror::Error;

/// Categories of snapd errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The snap (or snap file) does not exist
    NotFound,
    /// The request itself is malformed (bad channel, bad name)
    Invalid,
    /// snapd rejected or failed the operation
    Command,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::NotFound => "Snap not found",
            Self::Invalid => "Invalid request",
            Self::Command => "snapd operation failed",
            Self::Other => "Unexpected error",
        }
    }
}

/// Errors that can occur during snapd operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The snap is not installed
    #[error("snap \"{name}\" is not installed")]
    NotInstalled {
        /// Name of the snap
        name: String,
    },

    /// The snap carries no plug or slot with this name
    #[error("snap \"{snap}\" has no {kind} named \"{name}\"")]
    NoSuchConnector {
        /// Name of the snap
        snap: String,
        /// "plug" or "slot"
        kind: String,
        /// Requested connector name
        name: String,
    },

    /// A local snap file could not be found or read
    #[error("cannot read snap file: {}", path.display())]
    SnapFile {
        /// Path of the snap file
        path: PathBuf,
    },

    /// Channel does not follow `<track>/<risk>[/<branch>]`
    #[error("Invalid channel name '{channel}', {reason}")]
    InvalidChannel {
        /// The rejected channel string
        channel: String,
        /// Why it was rejected
        reason: String,
    },

    /// Snap name fails snapd's naming rules
    #[error("invalid snap name: '{name}'")]
    InvalidName {
        /// The rejected name
        name: String,
    },

    /// snapd rejected or failed an operation
    #[error("{operation} failed: {message}")]
    Command {
        /// Which operation failed (e.g. "service_start foo.daemon")
        operation: String,
        /// Error reported by snapd
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::NotInstalled { .. }
            | Error::NoSuchConnector { .. }
            | Error::SnapFile { .. } => ErrorCategory::NotFound,
            Error::InvalidChannel { .. } | Error::InvalidName { .. } => ErrorCategory::Invalid,
            Error::Command { .. } => ErrorCategory::Command,
            _ => ErrorCategory::Other,
        }
    }

    /// Whether the error means the snap is not installed.
    pub fn is_not_installed(&self) -> bool {
        matches!(self, Error::NotInstalled { .. })
    }

    /// Shorthand for a failed operation.
    pub fn command(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Command {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

/// Result type for snapd operations.
pub type Result<T> = std::result::Result<T, Error>;
