//! Pool front: turns `run` calls into dispatches or queue entries and
//! drains the queue whenever a worker frees capacity.
//!
//! The pool does not decide how many workers exist; callers supply them with
//! [`NovaPool::add_worker`]. The coordinator is driven by [`NovaPool::pump`],
//! which delivers worker messages and arms or fires idle timers. Workers
//! retired by idle expiry or by dying are torn down by [`NovaPool::reap`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use crossbeam_channel::Select;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{PoolConfig, QueueKind};
use crate::core::queue::TaskQueue;
use crate::core::resource_pool::ResourcePool;
use crate::core::signal::CancelSignal;
use crate::core::task::{TaskCallback, TaskIdGenerator, TaskOutcome, TaskRecord};
use crate::core::transfer::{TaskInput, TransferList};
use crate::core::worker_handle::WorkerHandle;
use crate::core::PoolError;
use crate::infra::queue::{ArrayTaskQueue, PriorityTaskQueue};
use crate::runtime::channel::message_channel;
use crate::runtime::protocol::ResponseMessage;
use crate::runtime::worker::{SideChannel, Worker, WorkerInit};
use crate::util::serde::{Priority, TaskId, WorkerId};

/// Export invoked when a task does not name one.
pub const DEFAULT_TASK_NAME: &str = "default";

/// Per-call options of [`NovaPool::run`].
#[derive(Default)]
pub struct RunOptions {
    /// Worker entry; falls back to the pool's configured filename.
    pub filename: Option<String>,
    /// Export within the entry; defaults to [`DEFAULT_TASK_NAME`].
    pub name: Option<String>,
    /// Buffers moved with the request.
    pub transfer_list: TransferList,
    /// Cancellation signal. Binding one makes the task abortable.
    pub signal: Option<Arc<dyn CancelSignal>>,
    /// Queue priority, honored by priority queues.
    pub priority: Priority,
    /// Side channel handed to the worker on dispatch.
    pub channel: Option<Arc<dyn SideChannel>>,
}

impl RunOptions {
    /// Options targeting `filename`.
    #[must_use]
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: Some(filename.into()),
            ..Self::default()
        }
    }

    /// Set the export name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the transfer list.
    #[must_use]
    pub fn with_transfer_list(mut self, transfer_list: TransferList) -> Self {
        self.transfer_list = transfer_list;
        self
    }

    /// Bind a cancellation signal.
    #[must_use]
    pub fn with_signal(mut self, signal: Arc<dyn CancelSignal>) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Set the queue priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Attach a side channel.
    #[must_use]
    pub fn with_channel(mut self, channel: Arc<dyn SideChannel>) -> Self {
        self.channel = Some(channel);
        self
    }
}

impl std::fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunOptions")
            .field("filename", &self.filename)
            .field("name", &self.name)
            .field("transfer_list", &self.transfer_list.len())
            .field("abortable", &self.signal.is_some())
            .field("priority", &self.priority)
            .field("channel", &self.channel.is_some())
            .finish()
    }
}

/// Snapshot of pool statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Workers tracked for scheduling, pending or ready.
    pub worker_count: usize,
    /// Workers that finished initialization.
    pub ready_workers: usize,
    /// Tasks waiting in the queue.
    pub queued_tasks: usize,
    /// Tasks dispatched and not yet completed.
    pub active_tasks: usize,
    /// Tasks accepted by `run`.
    pub submitted_tasks: u64,
    /// Tasks completed successfully.
    pub completed_tasks: u64,
    /// Tasks completed with an error other than cancellation.
    pub failed_tasks: u64,
    /// Tasks cancelled or aborted.
    pub cancelled_tasks: u64,
    /// `run` calls rejected synchronously.
    pub rejected_tasks: u64,
    /// Worker responses handled.
    pub responses: u64,
}

#[derive(Debug, Default)]
struct PoolCounters {
    submitted_tasks: AtomicU64,
    completed_tasks: AtomicU64,
    failed_tasks: AtomicU64,
    cancelled_tasks: AtomicU64,
    rejected_tasks: AtomicU64,
    responses: AtomicU64,
}

impl PoolCounters {
    fn record_outcome(&self, outcome: &TaskOutcome) {
        let counter = match outcome {
            Ok(_) => &self.completed_tasks,
            Err(PoolError::Cancelled | PoolError::Aborted) => &self.cancelled_tasks,
            Err(_) => &self.failed_tasks,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Worker id allocator with a free list.
#[derive(Debug, Default)]
struct WorkerIds {
    next: WorkerId,
    free: Vec<WorkerId>,
}

impl WorkerIds {
    fn allocate(&mut self) -> WorkerId {
        self.free.pop().unwrap_or_else(|| {
            let id = self.next;
            self.next += 1;
            id
        })
    }

    fn release(&mut self, id: WorkerId) {
        if !self.free.contains(&id) {
            self.free.push(id);
        }
    }
}

struct PoolShared {
    config: PoolConfig,
    workers: ResourcePool<WorkerHandle>,
    queue: Mutex<Option<Box<dyn TaskQueue>>>,
    queue_limit: Option<usize>,
    task_ids: TaskIdGenerator,
    worker_ids: Mutex<WorkerIds>,
    retiring: Mutex<Vec<Arc<WorkerHandle>>>,
    counters: PoolCounters,
    closed: AtomicBool,
}

impl PoolShared {
    /// Dispatch queued tasks while a worker has capacity.
    fn drain_queue(&self) {
        loop {
            let Some(handle) = self.workers.find_available() else {
                return;
            };
            let next = self.queue.lock().as_mut().and_then(|queue| queue.shift());
            let Some(task) = next else {
                return;
            };
            debug!(task_id = task.task_id(), worker_id = handle.worker_id(), "dispatching queued task");
            handle.dispatch(task);
        }
    }

    /// Remove a still-queued task and complete it with a cancel error.
    fn cancel_queued(&self, task_id: TaskId) {
        let removed = self.queue.lock().as_mut().and_then(|queue| queue.remove(task_id));
        if let Some(mut task) = removed {
            debug!(task_id, "queued task cancelled");
            task.cancel();
        }
    }

    fn queue_size(&self) -> usize {
        self.queue.lock().as_ref().map_or(0, |queue| queue.len())
    }

    /// Arm the idle timer of a worker that has nothing in flight.
    fn arm_idle(&self, handle: &WorkerHandle) {
        if let Some(after) = self.config.idle_timeout() {
            if handle.in_flight_count() == 0 && !handle.has_idle_timeout() {
                handle.set_idle_timeout(after);
            }
        }
    }

    /// Take a worker out of scheduling; it is torn down by the next reap.
    fn retire(&self, handle: &Arc<WorkerHandle>) {
        self.workers.remove(handle);
        let mut retiring = self.retiring.lock();
        if !retiring.iter().any(|h| Arc::ptr_eq(h, handle)) {
            retiring.push(Arc::clone(handle));
        }
    }

    /// Called after messages from `handle` were handled.
    fn after_messages(&self, handle: &Arc<WorkerHandle>) {
        self.workers.maybe_available(handle);
        self.arm_idle(handle);
    }
}

/// Task-execution pool front.
///
/// Cloning yields another handle to the same pool.
#[derive(Clone)]
pub struct NovaPool {
    shared: Arc<PoolShared>,
}

impl NovaPool {
    /// Create a pool with the queue backend named by the configuration.
    ///
    /// # Errors
    ///
    /// Returns the validation error if `config` is invalid.
    pub fn new(config: PoolConfig) -> Result<Self, PoolError> {
        let queue: Box<dyn TaskQueue> = match config.queue {
            QueueKind::Fifo => Box::new(ArrayTaskQueue::new()),
            QueueKind::Priority => Box::new(PriorityTaskQueue::new()),
        };
        Self::with_task_queue(config, queue)
    }

    /// Create a pool with a caller-supplied queue.
    ///
    /// A queue limit of `0` disables queueing and `queue` is unused.
    ///
    /// # Errors
    ///
    /// Returns the validation error if `config` is invalid.
    pub fn with_task_queue(config: PoolConfig, queue: Box<dyn TaskQueue>) -> Result<Self, PoolError> {
        config.validate()?;
        let queue_limit = config.queue_limit();
        let queue = if queue_limit == Some(0) { None } else { Some(queue) };

        let shared = Arc::new(PoolShared {
            workers: ResourcePool::new(config.concurrent_tasks_per_worker),
            queue: Mutex::new(queue),
            queue_limit,
            task_ids: TaskIdGenerator::new(),
            worker_ids: Mutex::new(WorkerIds::default()),
            retiring: Mutex::new(Vec::new()),
            counters: PoolCounters::default(),
            closed: AtomicBool::new(false),
            config,
        });

        let weak: Weak<PoolShared> = Arc::downgrade(&shared);
        shared.workers.on_available(Arc::new(move |_handle: &Arc<WorkerHandle>| {
            if let Some(shared) = weak.upgrade() {
                shared.drain_queue();
            }
        }));

        info!(
            max_threads = shared.config.max_threads,
            ceiling = shared.config.concurrent_tasks_per_worker,
            queue_limit = ?shared.queue_limit,
            "pool created"
        );
        Ok(Self { shared })
    }

    /// Pool configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Initialize `worker` and track it. Tasks are routed to it once it
    /// reports ready.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::PoolShutdown`] after shutdown, or the worker's
    /// initialization error.
    pub fn add_worker(&self, worker: Arc<dyn Worker>) -> Result<WorkerId, PoolError> {
        if self.is_closed() {
            return Err(PoolError::PoolShutdown);
        }
        let worker_id = self.shared.worker_ids.lock().allocate();
        let (port, worker_port) = message_channel();
        if let Err(err) = worker.initialize(WorkerInit::new(worker_id, worker_port)) {
            warn!(worker_id, error = %err, "worker failed to initialize");
            self.shared.worker_ids.lock().release(worker_id);
            return Err(err);
        }

        let weak = Arc::downgrade(&self.shared);
        let free_worker_id = Box::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.worker_ids.lock().release(worker_id);
            }
        });
        let weak = Arc::downgrade(&self.shared);
        let on_response = Arc::new(move |message: &ResponseMessage| {
            if let Some(shared) = weak.upgrade() {
                shared.counters.responses.fetch_add(1, Ordering::Relaxed);
            }
            debug!(task_id = message.task_id, used_memory = message.used_memory, "response received");
        });

        let handle = Arc::new(WorkerHandle::new(worker, port, worker_id, free_worker_id, on_response));
        self.shared.workers.add(handle);
        info!(worker_id, "worker added");
        Ok(worker_id)
    }

    /// Stop scheduling on a worker and tear it down. In-flight tasks fail
    /// with [`PoolError::ThreadTermination`].
    ///
    /// Returns `Ok(false)` if no such worker is tracked.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::TerminateTimeout`] if the worker did not exit in
    /// time.
    pub async fn remove_worker(&self, worker_id: WorkerId) -> Result<bool, PoolError> {
        let Some(handle) = self.find_handle(worker_id) else {
            return Ok(false);
        };
        self.shared.workers.remove(&handle);
        self.shared
            .retiring
            .lock()
            .retain(|h| !Arc::ptr_eq(h, &handle));
        handle.teardown(self.shared.config.terminate_timeout()).await?;
        Ok(true)
    }

    /// Submit a task. The callback receives its outcome exactly once.
    ///
    /// A task whose signal already fired completes with
    /// [`PoolError::Aborted`] without being queued. A queued task whose
    /// signal fires completes with [`PoolError::Cancelled`]. Once dispatched,
    /// cancellation is best effort only.
    ///
    /// # Errors
    ///
    /// Rejections are synchronous and never reach the callback:
    /// [`PoolError::FileNameNotProvided`] when no filename is known,
    /// [`PoolError::NoTaskQueueAvailable`] when queueing is disabled and
    /// every worker is saturated, [`PoolError::TaskQueueAtLimit`] when the
    /// queue is full, [`PoolError::PoolShutdown`] after shutdown.
    pub fn run(
        &self,
        input: impl Into<TaskInput>,
        options: RunOptions,
        callback: impl FnOnce(TaskOutcome) + Send + 'static,
    ) -> Result<TaskId, PoolError> {
        let shared = &self.shared;
        if self.is_closed() {
            return Err(self.reject(PoolError::PoolShutdown));
        }
        let Some(filename) = options.filename.or_else(|| shared.config.filename.clone()) else {
            return Err(self.reject(PoolError::FileNameNotProvided));
        };
        if filename.is_empty() {
            return Err(self.reject(PoolError::FileNameNotProvided));
        }
        let name = options.name.unwrap_or_else(|| DEFAULT_TASK_NAME.to_owned());
        let task_id = shared.task_ids.next_id();

        let counters = Arc::downgrade(shared);
        let callback: TaskCallback = Box::new(move |outcome: TaskOutcome| {
            if let Some(shared) = counters.upgrade() {
                shared.counters.record_outcome(&outcome);
            }
            callback(outcome);
        });

        if let Some(signal) = &options.signal {
            if signal.aborted() {
                shared.counters.submitted_tasks.fetch_add(1, Ordering::Relaxed);
                debug!(task_id, "signal already aborted");
                callback(Err(PoolError::Aborted));
                return Ok(task_id);
            }
        }

        // Strict FIFO: nothing overtakes tasks that are already waiting.
        let target = if shared.queue_size() == 0 {
            shared.workers.find_available()
        } else {
            None
        };
        if target.is_none() {
            let queue = shared.queue.lock();
            match (queue.as_ref(), shared.queue_limit) {
                (None, _) => return Err(self.reject(PoolError::NoTaskQueueAvailable)),
                (Some(queue), Some(limit)) if queue.len() >= limit => {
                    return Err(self.reject(PoolError::TaskQueueAtLimit));
                }
                _ => {}
            }
        }

        let mut record = TaskRecord::new(task_id, input, options.transfer_list, filename, name, callback)
            .with_priority(options.priority);
        if let Some(channel) = options.channel {
            record = record.with_channel(channel);
        }
        if let Some(signal) = options.signal.clone() {
            let weak = Arc::downgrade(shared);
            let listener = signal.subscribe_once(Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.cancel_queued(task_id);
                }
            }));
            record = record.with_cancel_signal(signal);
            record.set_cancel_listener(listener);
        }
        shared.counters.submitted_tasks.fetch_add(1, Ordering::Relaxed);

        if let Some(handle) = target {
            handle.dispatch(record);
            return Ok(task_id);
        }

        if let Some(queue) = shared.queue.lock().as_mut() {
            queue.push(record);
        }
        debug!(task_id, queued = shared.queue_size(), "task queued");
        // The signal may have fired between the first check and the
        // subscription; its listener would then have found nothing to remove.
        if options.signal.as_ref().is_some_and(|signal| signal.aborted()) {
            shared.cancel_queued(task_id);
        }
        Ok(task_id)
    }

    /// One coordinator step.
    ///
    /// Drains every worker whose response counter moved, then, if nothing
    /// was drained, waits up to `timeout` for one message from any worker.
    /// Finally handles idle-timer expiry. Returns the number of messages
    /// handled.
    pub fn pump(&self, timeout: Duration) -> usize {
        let handles = self.shared.workers.snapshot();
        let mut handled = 0;
        for handle in &handles {
            let drained = handle.drain_pending_responses();
            if drained > 0 {
                handled += drained;
                self.shared.after_messages(handle);
            }
        }

        if handled == 0 && !handles.is_empty() {
            handled += self.wait_for_message(&handles, timeout);
        }

        self.expire_idle(Instant::now());
        handled
    }

    fn wait_for_message(&self, handles: &[Arc<WorkerHandle>], timeout: Duration) -> usize {
        let mut select = Select::new();
        for handle in handles {
            select.recv(handle.port().receiver());
        }
        let Ok(operation) = select.select_timeout(timeout) else {
            return 0;
        };
        let idx = operation.index();
        let handle = &handles[idx];
        match operation.recv(handle.port().receiver()) {
            Ok(message) => {
                handle.handle_message(message);
                self.shared.after_messages(handle);
                1
            }
            Err(_) => {
                warn!(worker_id = handle.worker_id(), "worker disconnected; retiring");
                self.shared.retire(handle);
                0
            }
        }
    }

    /// Retire idle workers flagged for recycling, then ready workers whose
    /// idle timer elapsed, keeping at least `min_threads` workers.
    fn expire_idle(&self, now: Instant) {
        for handle in self.shared.workers.snapshot() {
            if handle.should_recycle() && handle.in_flight_count() == 0 {
                info!(worker_id = handle.worker_id(), "worker flagged for recycling; retiring");
                self.shared.retire(&handle);
                continue;
            }
            if !handle.idle_timeout_expired(now) {
                continue;
            }
            handle.clear_idle_timeout();
            if handle.in_flight_count() > 0 || self.shared.workers.len() <= self.shared.config.min_threads {
                continue;
            }
            info!(worker_id = handle.worker_id(), "idle timeout elapsed; retiring worker");
            self.shared.retire(&handle);
        }
    }

    /// Tear down retired workers. Returns how many were torn down.
    ///
    /// # Errors
    ///
    /// Returns the first teardown error; every retired worker is still torn
    /// down.
    pub async fn reap(&self) -> Result<usize, PoolError> {
        let retired = std::mem::take(&mut *self.shared.retiring.lock());
        let count = retired.len();
        let mut first_error = None;
        for handle in retired {
            if let Err(err) = handle.teardown(self.shared.config.terminate_timeout()).await {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(count), Err)
    }

    /// Number of queued tasks.
    #[must_use]
    pub fn queue_size(&self) -> usize {
        self.shared.queue_size()
    }

    /// Number of workers tracked for scheduling.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.shared.workers.len()
    }

    /// Number of workers waiting to be torn down by [`reap`](Self::reap).
    #[must_use]
    pub fn retiring_count(&self) -> usize {
        self.shared.retiring.lock().len()
    }

    /// Whether [`shutdown`](Self::shutdown) was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Worker handles, pending first.
    #[must_use]
    pub fn workers(&self) -> Vec<Arc<WorkerHandle>> {
        self.shared.workers.snapshot()
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let handles = self.shared.workers.snapshot();
        let counters = &self.shared.counters;
        PoolStats {
            worker_count: handles.len(),
            ready_workers: self.shared.workers.ready_len(),
            queued_tasks: self.queue_size(),
            active_tasks: handles.iter().map(|h| h.in_flight_count()).sum(),
            submitted_tasks: counters.submitted_tasks.load(Ordering::Relaxed),
            completed_tasks: counters.completed_tasks.load(Ordering::Relaxed),
            failed_tasks: counters.failed_tasks.load(Ordering::Relaxed),
            cancelled_tasks: counters.cancelled_tasks.load(Ordering::Relaxed),
            rejected_tasks: counters.rejected_tasks.load(Ordering::Relaxed),
            responses: counters.responses.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting tasks, tear down every worker, then fail the tasks
    /// still queued with [`PoolError::ThreadTermination`]. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns the first teardown error; every worker is still torn down
    /// and every queued task still failed.
    pub async fn shutdown(&self) -> Result<(), PoolError> {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        info!("shutting down pool");

        let mut handles = self.shared.workers.snapshot();
        for handle in &handles {
            self.shared.workers.remove(handle);
        }
        handles.append(&mut self.shared.retiring.lock());

        let mut first_error = None;
        for handle in handles {
            if let Err(err) = handle.teardown(self.shared.config.terminate_timeout()).await {
                first_error.get_or_insert(err);
            }
        }

        let queued: Vec<TaskRecord> = {
            let mut queue = self.shared.queue.lock();
            let mut drained = Vec::new();
            if let Some(queue) = queue.as_mut() {
                while let Some(task) = queue.shift() {
                    drained.push(task);
                }
            }
            drained
        };
        if !queued.is_empty() {
            warn!(count = queued.len(), "failing queued tasks on shutdown");
        }
        for mut task in queued {
            task.complete(Err(PoolError::ThreadTermination));
        }

        info!("pool shut down");
        first_error.map_or(Ok(()), Err)
    }

    fn find_handle(&self, worker_id: WorkerId) -> Option<Arc<WorkerHandle>> {
        let mut candidates = self.shared.workers.snapshot();
        candidates.extend(self.shared.retiring.lock().iter().cloned());
        candidates
            .into_iter()
            .find(|handle| handle.worker_id() == worker_id)
    }

    fn reject(&self, err: PoolError) -> PoolError {
        self.shared.counters.rejected_tasks.fetch_add(1, Ordering::Relaxed);
        warn!(error = %err, "task rejected");
        err
    }
}

impl std::fmt::Debug for NovaPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NovaPool")
            .field("workers", &self.shared.workers)
            .field("queued", &self.queue_size())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
