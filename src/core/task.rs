//! Task records: one submitted unit of work bound to its completion callback.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{warn, Span};

use crate::core::signal::{CancelSignal, ListenerId};
use crate::core::transfer::{TaskInput, TransferList};
use crate::core::PoolError;
use crate::runtime::worker::SideChannel;
use crate::util::serde::{Priority, TaskId, WorkerId};

/// Terminal state delivered to the submitter.
pub type TaskOutcome = Result<Value, PoolError>;

/// Completion callback, invoked exactly once per task.
pub type TaskCallback = Box<dyn FnOnce(TaskOutcome) + Send + 'static>;

/// Monotonic task id source.
///
/// Each pool owns one; [`TaskIdGenerator::global`] is the process-wide
/// fallback for records built outside a pool.
#[derive(Debug, Default)]
pub struct TaskIdGenerator {
    next: AtomicU64,
}

static GLOBAL_TASK_IDS: TaskIdGenerator = TaskIdGenerator::new();

impl TaskIdGenerator {
    /// Generator starting at 0.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(0),
        }
    }

    /// Process-wide generator.
    #[must_use]
    pub fn global() -> &'static Self {
        &GLOBAL_TASK_IDS
    }

    /// Issue the next id.
    pub fn next_id(&self) -> TaskId {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

/// One submitted unit of work.
///
/// Owned by the submitter (or a queue) until dispatched, then by the worker
/// handle that runs it until completion. A record is never reused.
pub struct TaskRecord {
    task_id: TaskId,
    payload: Option<Value>,
    transfer_list: TransferList,
    filename: String,
    name: String,
    priority: Priority,
    callback: Option<TaskCallback>,
    cancel_signal: Option<Arc<dyn CancelSignal>>,
    cancel_listener: Option<ListenerId>,
    channel: Option<Arc<dyn SideChannel>>,
    span: Span,
    created: Instant,
    started: Option<Instant>,
    worker_id: Option<WorkerId>,
}

impl TaskRecord {
    /// Create a record.
    ///
    /// A movable input is resolved here: its value becomes the payload and
    /// its buffers are appended to `transfer_list`. The span current at this
    /// point is the context the callback later runs in.
    pub fn new(
        task_id: TaskId,
        input: impl Into<TaskInput>,
        mut transfer_list: TransferList,
        filename: impl Into<String>,
        name: impl Into<String>,
        callback: TaskCallback,
    ) -> Self {
        let (payload, moved) = input.into().into_parts();
        transfer_list.extend(moved);
        Self {
            task_id,
            payload: Some(payload),
            transfer_list,
            filename: filename.into(),
            name: name.into(),
            priority: Priority::Normal,
            callback: Some(callback),
            cancel_signal: None,
            cancel_listener: None,
            channel: None,
            span: Span::current(),
            created: Instant::now(),
            started: None,
            worker_id: None,
        }
    }

    /// Bind a cancellation signal. Makes the task abortable.
    #[must_use]
    pub fn with_cancel_signal(mut self, signal: Arc<dyn CancelSignal>) -> Self {
        self.cancel_signal = Some(signal);
        self
    }

    /// Attach a side channel handed to the worker on dispatch.
    #[must_use]
    pub fn with_channel(mut self, channel: Arc<dyn SideChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Set the queue priority.
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Task identifier.
    #[must_use]
    pub const fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Worker entry the task targets.
    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Named export within the entry.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue priority.
    #[must_use]
    pub const fn priority(&self) -> Priority {
        self.priority
    }

    /// Buffers that move with the request.
    #[must_use]
    pub fn transfer_list(&self) -> &TransferList {
        &self.transfer_list
    }

    /// Bound cancellation signal.
    #[must_use]
    pub fn cancel_signal(&self) -> Option<&Arc<dyn CancelSignal>> {
        self.cancel_signal.as_ref()
    }

    /// Whether a cancellation signal is bound.
    #[must_use]
    pub const fn is_abortable(&self) -> bool {
        self.cancel_signal.is_some()
    }

    /// Side channel, if the task declared one.
    #[must_use]
    pub fn channel(&self) -> Option<&Arc<dyn SideChannel>> {
        self.channel.as_ref()
    }

    /// Remember the listener registered on the cancellation signal so it is
    /// detached on completion.
    pub fn set_cancel_listener(&mut self, id: ListenerId) {
        self.cancel_listener = Some(id);
    }

    /// Hand the payload off. Returns `None` if it was already released.
    pub fn release_payload(&mut self) -> Option<Value> {
        self.payload.take()
    }

    /// Whether the payload is still held locally.
    #[must_use]
    pub const fn has_payload(&self) -> bool {
        self.payload.is_some()
    }

    /// Record assignment to a worker and the dispatch time.
    pub fn mark_dispatched(&mut self, worker_id: WorkerId) {
        self.worker_id = Some(worker_id);
        self.started = Some(Instant::now());
    }

    /// Worker the task was dispatched to.
    #[must_use]
    pub const fn worker_id(&self) -> Option<WorkerId> {
        self.worker_id
    }

    /// Creation time.
    #[must_use]
    pub const fn created(&self) -> Instant {
        self.created
    }

    /// Dispatch time, `None` until dispatched.
    #[must_use]
    pub const fn started(&self) -> Option<Instant> {
        self.started
    }

    /// Whether the callback already ran.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        self.callback.is_none()
    }

    /// Deliver the terminal state.
    ///
    /// The callback runs inside the span captured at creation, then any
    /// cancellation listener is detached. Only the first call has an effect;
    /// returns whether this call delivered the outcome.
    pub fn complete(&mut self, outcome: TaskOutcome) -> bool {
        let Some(callback) = self.callback.take() else {
            warn!(task_id = self.task_id, "task already completed; ignoring");
            return false;
        };
        self.span.in_scope(|| callback(outcome));
        if let (Some(signal), Some(id)) = (&self.cancel_signal, self.cancel_listener.take()) {
            signal.unsubscribe(id);
        }
        true
    }

    /// Complete with [`PoolError::Cancelled`].
    pub fn cancel(&mut self) -> bool {
        self.complete(Err(PoolError::Cancelled))
    }
}

impl Drop for TaskRecord {
    fn drop(&mut self) {
        if !self.is_completed() {
            warn!(task_id = self.task_id, "task dropped before completion");
            self.complete(Err(PoolError::PoolShutdown));
        }
    }
}

impl std::fmt::Debug for TaskRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRecord")
            .field("task_id", &self.task_id)
            .field("filename", &self.filename)
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("abortable", &self.is_abortable())
            .field("worker_id", &self.worker_id)
            .field("completed", &self.is_completed())
            .finish_non_exhaustive()
    }
}
