//! Wire messages exchanged between the coordinator and a worker.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::util::serde::TaskId;

/// Request posted to a worker for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMessage {
    /// Identifier of the task.
    pub task_id: TaskId,
    /// Task payload, released from the task record.
    pub task: Value,
    /// Worker entry the task targets.
    pub filename: String,
    /// Named export within the entry.
    pub name: String,
}

/// Failure reported by a worker for a task.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{name}: {message}")]
pub struct RemoteError {
    /// Error kind as named by the worker.
    pub name: String,
    /// Human-readable description.
    pub message: String,
}

impl RemoteError {
    /// Build a remote error from a kind name and message.
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for RemoteError {
    fn from(err: anyhow::Error) -> Self {
        Self::new("Error", format!("{err:#}"))
    }
}

/// Response received from a worker for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMessage {
    /// Identifier of the task this response completes.
    pub task_id: TaskId,
    /// Task result; `Null` when the task failed.
    pub result: Value,
    /// Failure, if any.
    pub error: Option<RemoteError>,
    /// Memory figure reported by the worker with this response. Each worker
    /// defines its measure; [`ThreadWorker`](crate::runtime::ThreadWorker)
    /// reports the bytes moved to it with the request.
    pub used_memory: u64,
}

impl ResponseMessage {
    /// Successful response.
    #[must_use]
    pub fn ok(task_id: TaskId, result: Value, used_memory: u64) -> Self {
        Self {
            task_id,
            result,
            error: None,
            used_memory,
        }
    }

    /// Failed response.
    #[must_use]
    pub fn failed(task_id: TaskId, error: RemoteError, used_memory: u64) -> Self {
        Self {
            task_id,
            result: Value::Null,
            error: Some(error),
            used_memory,
        }
    }
}

/// Message flowing from a worker to the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    /// Worker finished initialization and accepts tasks.
    Ready,
    /// Task response.
    Response(ResponseMessage),
}
