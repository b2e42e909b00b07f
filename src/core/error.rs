//! Error types for pool, task and worker operations.

use thiserror::Error;

use crate::runtime::protocol::RemoteError;

/// Errors produced by pool components.
///
/// Task-scoped failures reach the submitter through the task's completion
/// callback. Configuration failures are returned synchronously from the call
/// that violated the precondition.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PoolError {
    /// Task cancelled before or during execution by explicit request.
    #[error("The task has been cancelled")]
    Cancelled,
    /// A task bound to an abort signal was aborted.
    #[error("The task has been aborted")]
    Aborted,
    /// The owning worker was terminated while the task was in flight.
    #[error("Terminating worker thread")]
    ThreadTermination,
    /// No queue is configured and every worker is saturated.
    #[error("No task queue available and all Workers are busy")]
    NoTaskQueueAvailable,
    /// The configured queue reached its maximum size.
    #[error("Task queue is at limit")]
    TaskQueueAtLimit,
    /// No worker entry identifier was given to the task or the pool.
    #[error("filename must be provided to run() or in options object")]
    FileNameNotProvided,
    /// Posting the request to the worker failed synchronously.
    #[error("failed to post task: {0}")]
    Dispatch(String),
    /// The worker reported a failure for the task.
    #[error("{0}")]
    Remote(RemoteError),
    /// The worker did not confirm termination within the timeout.
    #[error("Failed to terminate worker")]
    TerminateTimeout,
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The pool has been shut down.
    #[error("pool has been shut down")]
    PoolShutdown,
}

impl PoolError {
    /// Stable name of the error kind, as reported to diagnostics and workers.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Cancelled => "CancelError",
            Self::Aborted => "AbortError",
            Self::ThreadTermination => "ThreadTerminationError",
            Self::NoTaskQueueAvailable => "NoTaskQueueAvailableError",
            Self::TaskQueueAtLimit => "TaskQueueAtLimitError",
            Self::FileNameNotProvided => "FileNameNotProvidedError",
            Self::Dispatch(_) => "DispatchError",
            Self::Remote(_) => "RemoteError",
            Self::TerminateTimeout => "TerminateTimeoutError",
            Self::InvalidConfig(_) => "InvalidConfigError",
            Self::PoolShutdown => "PoolShutdownError",
        }
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
