//! Core scheduling abstractions: task records, worker handles, the
//! readiness-gated resource pool and the pool front.

pub mod error;
pub mod queue;
pub mod resource_pool;
pub mod scheduler;
pub mod signal;
pub mod task;
pub mod transfer;
pub mod worker_handle;

pub use error::{AppResult, PoolError};
pub use queue::TaskQueue;
pub use resource_pool::{AsyncResource, AvailabilityListener, Readiness, ResourcePool, INFINITE_USAGE};
pub use scheduler::{NovaPool, PoolStats, RunOptions, DEFAULT_TASK_NAME};
pub use signal::{
    AbortController, AbortListener, AbortSignal, CancelSignal, EventEmitter, EventEmitterSignal,
    EventTarget, EventTargetSignal, ListenerId,
};
pub use task::{TaskCallback, TaskIdGenerator, TaskOutcome, TaskRecord};
pub use transfer::{TaskInput, TransferHandle, TransferList};
pub use worker_handle::{FreeWorkerId, ResponseCallback, WorkerHandle};
