//! Coordinator-side handle for one worker.
//!
//! The handle owns the worker's channel and its in-flight task map. It posts
//! tasks, resolves their records from worker responses, and reports its load
//! to the [`ResourcePool`](crate::core::ResourcePool).
//!
//! Responses reach the handle two ways: one at a time through
//! [`WorkerHandle::process_next_message`] (the event path), or in bursts
//! through [`WorkerHandle::drain_pending_responses`], which only touches the
//! channel when the shared response counter moved.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::core::resource_pool::{AsyncResource, Readiness, INFINITE_USAGE};
use crate::core::task::TaskRecord;
use crate::core::PoolError;
use crate::runtime::channel::MessagePort;
use crate::runtime::counters::{SharedCounters, REQUEST_COUNT_FIELD, RESPONSE_COUNT_FIELD};
use crate::runtime::protocol::{RequestMessage, ResponseMessage, WorkerMessage};
use crate::runtime::worker::Worker;
use crate::util::serde::{TaskId, WorkerId};

/// Pool-manager hook run for every response, after the record left the
/// in-flight map and before its callback fires.
pub type ResponseCallback = Arc<dyn Fn(&ResponseMessage) + Send + Sync + 'static>;

/// Releases the worker id back to the pool's free list.
pub type FreeWorkerId = Box<dyn FnOnce() + Send + 'static>;

/// Handle for one worker: channel, in-flight tasks, readiness and idle state.
pub struct WorkerHandle {
    worker: Arc<dyn Worker>,
    worker_id: WorkerId,
    free_worker_id: Mutex<Option<FreeWorkerId>>,
    in_flight: Mutex<HashMap<TaskId, TaskRecord>>,
    idle_deadline: Mutex<Option<Instant>>,
    port: MessagePort,
    counters: SharedCounters,
    last_seen_response_count: AtomicI32,
    used_memory: AtomicU64,
    should_recycle: AtomicBool,
    terminated: AtomicBool,
    readiness: Readiness,
    on_response: ResponseCallback,
}

impl WorkerHandle {
    /// Wrap a provisioned worker and the coordinator end of its channel.
    pub fn new(
        worker: Arc<dyn Worker>,
        port: MessagePort,
        worker_id: WorkerId,
        free_worker_id: FreeWorkerId,
        on_response: ResponseCallback,
    ) -> Self {
        let counters = port.counters().clone();
        Self {
            worker,
            worker_id,
            free_worker_id: Mutex::new(Some(free_worker_id)),
            in_flight: Mutex::new(HashMap::new()),
            idle_deadline: Mutex::new(None),
            port,
            counters,
            last_seen_response_count: AtomicI32::new(0),
            used_memory: AtomicU64::new(0),
            should_recycle: AtomicBool::new(false),
            terminated: AtomicBool::new(false),
            readiness: Readiness::new(),
            on_response,
        }
    }

    /// Pool-assigned worker id.
    #[must_use]
    pub const fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    /// The wrapped worker.
    #[must_use]
    pub fn worker(&self) -> &Arc<dyn Worker> {
        &self.worker
    }

    /// Coordinator end of the worker channel.
    #[must_use]
    pub const fn port(&self) -> &MessagePort {
        &self.port
    }

    /// Post a task to the worker.
    ///
    /// A synchronous send failure completes the record with that error and
    /// leaves the in-flight map untouched.
    ///
    /// # Panics
    ///
    /// Panics if a task with the same id is already in flight on this handle.
    pub fn dispatch(&self, mut record: TaskRecord) {
        let task_id = record.task_id();
        assert!(
            !self.in_flight.lock().contains_key(&task_id),
            "task {task_id} is already in flight on worker {}",
            self.worker_id
        );
        let message = RequestMessage {
            task_id,
            task: record.release_payload().unwrap_or(Value::Null),
            filename: record.filename().to_owned(),
            name: record.name().to_owned(),
        };
        if let Some(channel) = record.channel() {
            self.worker.set_channel(Arc::clone(channel));
        }
        if let Err(err) = self.port.post_message(message, record.transfer_list()) {
            warn!(worker_id = self.worker_id, task_id, error = %err, "failed to post task");
            record.complete(Err(err));
            return;
        }

        record.mark_dispatched(self.worker_id);
        self.in_flight.lock().insert(task_id, record);
        self.reference();
        self.clear_idle_timeout();

        self.counters.add_and_notify(REQUEST_COUNT_FIELD);
        debug!(worker_id = self.worker_id, task_id, "task dispatched");
    }

    /// Handle one message from the worker.
    pub fn handle_message(&self, message: WorkerMessage) {
        match message {
            WorkerMessage::Ready => {
                if self.mark_ready() {
                    info!(worker_id = self.worker_id, "worker ready");
                }
            }
            WorkerMessage::Response(response) => self.handle_response(response),
        }
    }

    /// Resolve the record a response belongs to.
    ///
    /// Records reported memory, runs the response hook, completes the record,
    /// and drops the keep-alive reference once nothing is in flight.
    pub fn handle_response(&self, message: ResponseMessage) {
        self.used_memory.store(message.used_memory, Ordering::Relaxed);
        let record = self.in_flight.lock().remove(&message.task_id);
        (self.on_response)(&message);

        match record {
            Some(mut record) => {
                let outcome = match message.error {
                    Some(error) => Err(PoolError::Remote(error)),
                    None => Ok(message.result),
                };
                debug!(worker_id = self.worker_id, task_id = message.task_id, "task completed");
                record.complete(outcome);
            }
            None => warn!(
                worker_id = self.worker_id,
                task_id = message.task_id,
                "response for unknown task"
            ),
        }

        if self.in_flight.lock().is_empty() {
            self.unreference();
        }
    }

    /// Synchronously handle every message the worker already produced.
    ///
    /// Only reads the channel when the shared response counter moved since
    /// the last drain. Never waits. Returns the number of messages handled.
    pub fn drain_pending_responses(&self) -> usize {
        let actual = self.counters.load(RESPONSE_COUNT_FIELD);
        if actual == self.last_seen_response_count.load(Ordering::Acquire) {
            return 0;
        }
        self.last_seen_response_count.store(actual, Ordering::Release);

        let mut handled = 0;
        while let Some(message) = self.port.try_receive() {
            self.handle_message(message);
            handled += 1;
        }
        if handled > 0 {
            debug!(worker_id = self.worker_id, handled, "drained responses");
        }
        handled
    }

    /// Wait up to `timeout` for one message and handle it. Returns whether a
    /// message arrived.
    pub fn process_next_message(&self, timeout: Duration) -> bool {
        match self.port.recv_timeout(timeout) {
            Some(message) => {
                self.handle_message(message);
                true
            }
            None => false,
        }
    }

    /// True iff exactly one task is in flight and it is abortable.
    #[must_use]
    pub fn is_running_abortable_task(&self) -> bool {
        let in_flight = self.in_flight.lock();
        in_flight.len() == 1 && in_flight.values().all(TaskRecord::is_abortable)
    }

    /// Number of tasks in flight.
    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Whether `task_id` is in flight on this handle.
    #[must_use]
    pub fn is_tracking(&self, task_id: TaskId) -> bool {
        self.in_flight.lock().contains_key(&task_id)
    }

    /// Terminate the worker and fail everything still in flight with
    /// [`PoolError::ThreadTermination`].
    ///
    /// Cleanup runs whether termination is confirmed or `timeout` fires
    /// first. Calling again after the first teardown is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::TerminateTimeout`] if the worker did not confirm
    /// termination within `timeout`.
    pub async fn teardown(&self, timeout: Option<Duration>) -> Result<(), PoolError> {
        if self.terminated.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        info!(worker_id = self.worker_id, "terminating worker");

        let result = match timeout {
            Some(limit) => tokio::time::timeout(limit, self.worker.terminate())
                .await
                .map_err(|_| PoolError::TerminateTimeout),
            None => {
                self.worker.terminate().await;
                Ok(())
            }
        };
        if result.is_err() {
            warn!(worker_id = self.worker_id, "worker did not terminate in time");
        }

        self.port.close();
        self.clear_idle_timeout();
        let orphaned: Vec<TaskRecord> = self.in_flight.lock().drain().map(|(_, record)| record).collect();
        for mut record in orphaned {
            record.complete(Err(PoolError::ThreadTermination));
        }
        self.unreference();
        if let Some(free) = self.free_worker_id.lock().take() {
            free();
        }
        result
    }

    /// Whether teardown started.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    /// Arm the idle timer.
    pub fn set_idle_timeout(&self, after: Duration) {
        *self.idle_deadline.lock() = Some(Instant::now() + after);
    }

    /// Disarm the idle timer.
    pub fn clear_idle_timeout(&self) {
        self.idle_deadline.lock().take();
    }

    /// Whether an armed idle timer elapsed by `now`.
    #[must_use]
    pub fn idle_timeout_expired(&self, now: Instant) -> bool {
        self.idle_deadline
            .lock()
            .is_some_and(|deadline| now >= deadline)
    }

    /// Whether the idle timer is armed.
    #[must_use]
    pub fn has_idle_timeout(&self) -> bool {
        self.idle_deadline.lock().is_some()
    }

    /// Keep the owner alive while work is in flight.
    pub fn reference(&self) -> &Self {
        self.port.reference();
        self.worker.set_referenced(true);
        self
    }

    /// Stop keeping the owner alive.
    pub fn unreference(&self) -> &Self {
        self.port.unreference();
        self.worker.set_referenced(false);
        self
    }

    /// Whether the handle currently keeps its owner alive.
    #[must_use]
    pub fn is_referenced(&self) -> bool {
        self.port.is_referenced()
    }

    /// Memory the worker reported with its last response.
    #[must_use]
    pub fn used_memory(&self) -> u64 {
        self.used_memory.load(Ordering::Relaxed)
    }

    /// Flag the worker for replacement. A flagged worker takes no new work
    /// and the pool retires it once nothing is in flight.
    pub fn set_should_recycle(&self, recycle: bool) {
        self.should_recycle.store(recycle, Ordering::Release);
    }

    /// Whether the worker is flagged for replacement.
    #[must_use]
    pub fn should_recycle(&self) -> bool {
        self.should_recycle.load(Ordering::Acquire)
    }

    /// Transition to ready. Returns `false` if it already was.
    pub fn mark_ready(&self) -> bool {
        self.readiness.mark_ready()
    }

    /// Whether the worker is ready.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.readiness.is_ready()
    }
}

impl AsyncResource for WorkerHandle {
    fn readiness(&self) -> &Readiness {
        &self.readiness
    }

    /// An abortable task monopolizes the worker. A worker flagged for
    /// recycling takes no new work.
    fn current_usage(&self) -> usize {
        if self.should_recycle() {
            return INFINITE_USAGE;
        }
        let in_flight = self.in_flight.lock();
        if in_flight.len() == 1 && in_flight.values().all(TaskRecord::is_abortable) {
            return INFINITE_USAGE;
        }
        in_flight.len()
    }
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("worker_id", &self.worker_id)
            .field("in_flight", &self.in_flight_count())
            .field("ready", &self.is_ready())
            .field("terminated", &self.is_terminated())
            .field("counters", &self.counters)
            .finish_non_exhaustive()
    }
}
