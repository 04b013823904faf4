//! Error types used by the launch coordinator, the before-run pipeline and the store.
//!
//! This module defines three enums:
//!
//! - [`LaunchError`]: why a launch did not (or could not) start.
//! - [`BeforeRunError`]: failures raised by individual before-run providers.
//! - [`StoreError`]: configuration store and persistence failures.
//!
//! All of them provide `as_label` (stable snake_case, for logs/metrics) and
//! `as_message` helpers.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// # Errors produced while launching a configuration.
///
/// Every variant downgrades to a "not started" notification. Only
/// non-cancellation variants are surfaced to the user-facing error reporter.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LaunchError {
    /// The executor/target combination rejects the configuration.
    #[error("configuration '{record}' cannot be run with executor '{executor}'")]
    CannotRun {
        /// Unique id of the rejected record.
        record: String,
        /// Executor id.
        executor: String,
    },

    /// No runner is registered for the executor/configuration pair.
    #[error("no runner for executor '{executor}' and configuration '{record}'")]
    RunnerNotFound {
        /// Unique id of the record.
        record: String,
        /// Executor id.
        executor: String,
    },

    /// Configuration settings are invalid.
    #[error("invalid configuration '{record}': {message}")]
    Validation {
        /// Unique id of the record.
        record: String,
        /// Validation message.
        message: String,
    },

    /// A before-run provider failed (not canceled).
    #[error("before-run task '{provider}' failed: {message}")]
    BeforeRun {
        /// Provider id.
        provider: String,
        /// Underlying error message.
        message: String,
    },

    /// The runner failed to start the process.
    #[error("start failed: {message}")]
    StartFailed {
        /// Underlying error message.
        message: String,
    },

    /// The runner returned no content descriptor.
    #[error("runner returned no content descriptor")]
    NoDescriptor,

    /// Launch was canceled by a before-run task or by the user.
    #[error("launch canceled")]
    Canceled,

    /// The coordinator was disposed (project closed) while the launch was in flight.
    #[error("coordinator closed")]
    Closed,
}

impl LaunchError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use launchvisor::LaunchError;
    ///
    /// let err = LaunchError::NoDescriptor;
    /// assert_eq!(err.as_label(), "launch_no_descriptor");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            LaunchError::CannotRun { .. } => "launch_cannot_run",
            LaunchError::RunnerNotFound { .. } => "launch_runner_not_found",
            LaunchError::Validation { .. } => "launch_validation",
            LaunchError::BeforeRun { .. } => "launch_before_run_failed",
            LaunchError::StartFailed { .. } => "launch_start_failed",
            LaunchError::NoDescriptor => "launch_no_descriptor",
            LaunchError::Canceled => "launch_canceled",
            LaunchError::Closed => "launch_closed",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            LaunchError::CannotRun { record, executor } => {
                format!("cannot run: record={record} executor={executor}")
            }
            LaunchError::RunnerNotFound { record, executor } => {
                format!("runner not found: record={record} executor={executor}")
            }
            LaunchError::Validation { record, message } => {
                format!("validation: record={record} {message}")
            }
            LaunchError::BeforeRun { provider, message } => {
                format!("before-run: provider={provider} {message}")
            }
            LaunchError::StartFailed { message } => format!("start: {message}"),
            LaunchError::NoDescriptor => "start: no descriptor".to_string(),
            LaunchError::Canceled => "canceled".to_string(),
            LaunchError::Closed => "closed".to_string(),
        }
    }

    /// True for errors that must not be reported as failures
    /// (user/process cancellation and project close).
    ///
    /// # Example
    /// ```
    /// use launchvisor::LaunchError;
    ///
    /// assert!(LaunchError::Canceled.is_cancellation());
    /// assert!(!LaunchError::NoDescriptor.is_cancellation());
    /// ```
    pub fn is_cancellation(&self) -> bool {
        matches!(self, LaunchError::Canceled | LaunchError::Closed)
    }
}

/// # Errors produced by before-run providers.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BeforeRunError {
    /// The task observed cancellation; the pipeline aborts silently.
    #[error("before-run task canceled")]
    Canceled,

    /// The task failed; the pipeline aborts and the failure is reported.
    #[error("before-run task failed: {error}")]
    Failed {
        /// The underlying error message.
        error: String,
    },
}

impl BeforeRunError {
    /// Convenience constructor for [`BeforeRunError::Failed`].
    pub fn failed(error: impl Into<String>) -> Self {
        BeforeRunError::Failed {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            BeforeRunError::Canceled => "before_run_canceled",
            BeforeRunError::Failed { .. } => "before_run_failed",
        }
    }
}

/// # Errors produced by the configuration store and its storage backends.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum StoreError {
    /// Selecting (or otherwise addressing) a record that is not in the live collection.
    #[error("record '{id}' must be added before it is selected")]
    NotMember {
        /// Unique id that was addressed.
        id: String,
    },

    /// No record with the given id.
    #[error("unknown record '{id}'")]
    UnknownRecord {
        /// Unique id that was addressed.
        id: String,
    },

    /// Reading or writing persisted state failed.
    #[error("storage i/o on '{}': {source}", path.display())]
    Io {
        /// File the operation touched.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// Persisted state could not be encoded or decoded.
    #[error("malformed state in '{}': {source}", path.display())]
    Format {
        /// File the operation touched.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use launchvisor::StoreError;
    ///
    /// let err = StoreError::NotMember { id: "App.main".into() };
    /// assert_eq!(err.as_label(), "store_not_member");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            StoreError::NotMember { .. } => "store_not_member",
            StoreError::UnknownRecord { .. } => "store_unknown_record",
            StoreError::Io { .. } => "store_io",
            StoreError::Format { .. } => "store_format",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_is_silent() {
        assert!(LaunchError::Canceled.is_cancellation());
        assert!(LaunchError::Closed.is_cancellation());
        let failed = LaunchError::BeforeRun {
            provider: "make".into(),
            message: "exit 2".into(),
        };
        assert!(!failed.is_cancellation());
        assert_eq!(failed.as_label(), "launch_before_run_failed");
        assert!(failed.as_message().contains("provider=make"));
    }

    #[test]
    fn before_run_failed_constructor() {
        let err = BeforeRunError::failed("boom");
        assert_eq!(err, BeforeRunError::Failed { error: "boom".into() });
        assert_eq!(err.to_string(), "before-run task failed: boom");
    }
}
