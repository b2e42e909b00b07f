//! Tests for error types

use nova_pool::core::PoolError;
use nova_pool::runtime::RemoteError;

#[test]
fn test_cancel_error() {
    let err = PoolError::Cancelled;
    assert_eq!(format!("{err}"), "The task has been cancelled");
    assert_eq!(err.kind(), "CancelError");
}

#[test]
fn test_abort_error() {
    let err = PoolError::Aborted;
    assert_eq!(format!("{err}"), "The task has been aborted");
    assert_eq!(err.kind(), "AbortError");
}

#[test]
fn test_thread_termination_error() {
    let err = PoolError::ThreadTermination;
    assert_eq!(format!("{err}"), "Terminating worker thread");
    assert_eq!(err.kind(), "ThreadTerminationError");
}

#[test]
fn test_queue_errors() {
    assert_eq!(
        format!("{}", PoolError::NoTaskQueueAvailable),
        "No task queue available and all Workers are busy"
    );
    assert_eq!(format!("{}", PoolError::TaskQueueAtLimit), "Task queue is at limit");
    assert_eq!(PoolError::TaskQueueAtLimit.kind(), "TaskQueueAtLimitError");
}

#[test]
fn test_file_name_not_provided_error() {
    let err = PoolError::FileNameNotProvided;
    assert_eq!(
        format!("{err}"),
        "filename must be provided to run() or in options object"
    );
    assert_eq!(err.kind(), "FileNameNotProvidedError");
}

#[test]
fn test_remote_error_keeps_worker_message() {
    let err = PoolError::Remote(RemoteError::new("RangeError", "out of range"));
    assert!(format!("{err}").contains("RangeError: out of range"));
}

#[test]
fn test_terminate_timeout_error() {
    assert_eq!(format!("{}", PoolError::TerminateTimeout), "Failed to terminate worker");
}
