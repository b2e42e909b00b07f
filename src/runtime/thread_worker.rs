//! Worker backed by a dedicated OS thread.
//!
//! The thread blocks on its request channel and runs the handler registered
//! for each request's `(filename, name)` pair. No polling: the loop selects
//! over requests and a shutdown channel, and exits when either fires or the
//! coordinator closes the port.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use async_trait::async_trait;
use crossbeam_channel::{bounded, select, Receiver, Sender};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::core::PoolError;
use crate::runtime::channel::{WorkerPort, WorkerRequest};
use crate::runtime::protocol::{RemoteError, ResponseMessage};
use crate::runtime::worker::{SideChannel, Worker, WorkerInit};
use crate::util::serde::WorkerId;

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

type SharedChannel = Arc<Mutex<Option<Arc<dyn SideChannel>>>>;

/// What a handler sees besides the payload.
pub struct TaskContext {
    /// Worker running the task.
    pub worker_id: WorkerId,
    /// Buffers moved with the request, in transfer-list order.
    pub transferred: Vec<Vec<u8>>,
    /// Side channel most recently handed to the worker, if any.
    pub channel: Option<Arc<dyn SideChannel>>,
    /// Opaque data the worker was started with.
    pub worker_data: Value,
}

impl std::fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskContext")
            .field("worker_id", &self.worker_id)
            .field("transferred", &self.transferred.len())
            .field("channel", &self.channel.is_some())
            .finish_non_exhaustive()
    }
}

/// Code a [`ThreadWorker`] runs for one request.
pub trait TaskHandler: Send + Sync {
    /// Compute the result for `payload`. Errors are reported to the
    /// coordinator as a [`RemoteError`].
    ///
    /// # Errors
    ///
    /// Any error the task itself raises.
    fn handle(&self, payload: Value, ctx: &TaskContext) -> anyhow::Result<Value>;
}

impl<F> TaskHandler for F
where
    F: Fn(Value, &TaskContext) -> anyhow::Result<Value> + Send + Sync,
{
    fn handle(&self, payload: Value, ctx: &TaskContext) -> anyhow::Result<Value> {
        self(payload, ctx)
    }
}

/// Handlers keyed by `(filename, name)`.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<(String, String), Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `filename`'s export `name`, replacing any
    /// previous one.
    #[must_use]
    pub fn with_handler(
        mut self,
        filename: impl Into<String>,
        name: impl Into<String>,
        handler: impl TaskHandler + 'static,
    ) -> Self {
        self.handlers
            .insert((filename.into(), name.into()), Arc::new(handler));
        self
    }

    /// Handler for a request target.
    #[must_use]
    pub fn get(&self, filename: &str, name: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers
            .get(&(filename.to_owned(), name.to_owned()))
            .cloned()
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handler is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.handlers.keys()).finish()
    }
}

#[derive(Default)]
struct ThreadState {
    shutdown_tx: Option<Sender<()>>,
    exited: Option<oneshot::Receiver<()>>,
    join: Option<JoinHandle<()>>,
}

/// Fires the exit signal when the worker thread unwinds or returns.
struct ExitGuard(Option<oneshot::Sender<()>>);

impl Drop for ExitGuard {
    fn drop(&mut self) {
        if let Some(tx) = self.0.take() {
            let _ = tx.send(());
        }
    }
}

/// [`Worker`] running its handlers on one dedicated OS thread.
///
/// A panicking handler fails only its own task, with a `Panic` remote
/// error; the thread keeps serving. The `used_memory` it reports is the
/// number of bytes moved to it with the request, not a heap measure.
pub struct ThreadWorker {
    registry: HandlerRegistry,
    stack_size: Option<usize>,
    thread_id: u64,
    channel: SharedChannel,
    referenced: AtomicBool,
    state: Mutex<ThreadState>,
}

impl ThreadWorker {
    /// Worker that serves requests from `registry`.
    #[must_use]
    pub fn new(registry: HandlerRegistry) -> Self {
        Self {
            registry,
            stack_size: None,
            thread_id: NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed),
            channel: Arc::new(Mutex::new(None)),
            referenced: AtomicBool::new(false),
            state: Mutex::new(ThreadState::default()),
        }
    }

    /// Stack size of the worker thread.
    #[must_use]
    pub const fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = Some(stack_size);
        self
    }

    /// Whether the worker is currently marked as keeping its host alive.
    #[must_use]
    pub fn is_referenced(&self) -> bool {
        self.referenced.load(Ordering::Acquire)
    }

    /// Whether the thread was started and has not been terminated.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state.lock().shutdown_tx.is_some()
    }
}

#[async_trait]
impl Worker for ThreadWorker {
    fn runtime(&self) -> &str {
        "thread"
    }

    fn thread_id(&self) -> u64 {
        self.thread_id
    }

    fn initialize(&self, init: WorkerInit) -> Result<(), PoolError> {
        let mut state = self.state.lock();
        if state.join.is_some() {
            return Err(PoolError::Dispatch("worker already initialized".into()));
        }
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let (exit_tx, exit_rx) = oneshot::channel();

        let registry = self.registry.clone();
        let channel = Arc::clone(&self.channel);
        let worker_id = init.worker_id;

        let mut builder = thread::Builder::new().name(format!("nova-worker-{worker_id}"));
        if let Some(stack_size) = self.stack_size {
            builder = builder.stack_size(stack_size);
        }
        let join = builder
            .spawn(move || {
                let _guard = ExitGuard(Some(exit_tx));
                run_worker_loop(init, &registry, &channel, &shutdown_rx);
            })
            .map_err(|e| PoolError::Dispatch(format!("failed to spawn worker thread: {e}")))?;

        state.shutdown_tx = Some(shutdown_tx);
        state.exited = Some(exit_rx);
        state.join = Some(join);
        info!(worker_id, thread_id = self.thread_id, "worker thread started");
        Ok(())
    }

    async fn terminate(&self) {
        let (shutdown_tx, exited, join) = {
            let mut state = self.state.lock();
            (state.shutdown_tx.take(), state.exited.take(), state.join.take())
        };
        if let Some(tx) = shutdown_tx {
            let _ = tx.try_send(());
        }
        if let Some(exited) = exited {
            let _ = exited.await;
        }
        // The thread has signalled its exit, so the join is short, but it
        // still must not run on a runtime thread.
        if let Some(join) = join {
            match tokio::task::spawn_blocking(move || join.join()).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => warn!(thread_id = self.thread_id, "worker thread panicked"),
                Err(err) => warn!(thread_id = self.thread_id, error = %err, "failed to join worker thread"),
            }
        }
    }

    fn set_channel(&self, channel: Arc<dyn SideChannel>) {
        *self.channel.lock() = Some(channel);
    }

    fn set_referenced(&self, referenced: bool) {
        self.referenced.store(referenced, Ordering::Release);
    }
}

impl Drop for ThreadWorker {
    fn drop(&mut self) {
        // Unblock the thread but do not join it here.
        if let Some(tx) = self.state.get_mut().shutdown_tx.take() {
            let _ = tx.try_send(());
        }
    }
}

impl std::fmt::Debug for ThreadWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadWorker")
            .field("thread_id", &self.thread_id)
            .field("registry", &self.registry)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

fn run_worker_loop(
    init: WorkerInit,
    registry: &HandlerRegistry,
    channel: &SharedChannel,
    shutdown_rx: &Receiver<()>,
) {
    let WorkerInit {
        worker_id,
        port,
        worker_data,
    } = init;
    if port.post_ready().is_err() {
        debug!(worker_id, "coordinator gone before ready");
        return;
    }

    loop {
        select! {
            recv(port.requests()) -> request => match request {
                Ok(request) => {
                    if !serve(worker_id, &port, registry, channel, &worker_data, request) {
                        break;
                    }
                }
                Err(_) => {
                    debug!(worker_id, "request channel closed, exiting");
                    break;
                }
            },
            recv(shutdown_rx) -> _ => {
                debug!(worker_id, "shutdown requested, exiting");
                break;
            }
        }
    }
}

/// Run one request and post its response. Returns `false` once the
/// coordinator is gone.
fn serve(
    worker_id: WorkerId,
    port: &WorkerPort,
    registry: &HandlerRegistry,
    channel: &SharedChannel,
    worker_data: &Value,
    request: WorkerRequest,
) -> bool {
    let WorkerRequest {
        message,
        transferred,
    } = request;
    let task_id = message.task_id;
    let used_memory = transferred.iter().map(|buf| buf.len() as u64).sum();

    let response = match registry.get(&message.filename, &message.name) {
        Some(handler) => {
            let ctx = TaskContext {
                worker_id,
                transferred,
                channel: channel.lock().clone(),
                worker_data: worker_data.clone(),
            };
            debug!(worker_id, task_id, "worker executing task");
            match panic::catch_unwind(AssertUnwindSafe(|| handler.handle(message.task, &ctx))) {
                Ok(Ok(result)) => ResponseMessage::ok(task_id, result, used_memory),
                Ok(Err(err)) => ResponseMessage::failed(task_id, RemoteError::from(err), used_memory),
                Err(payload) => {
                    let reason = panic_message(payload.as_ref());
                    warn!(worker_id, task_id, reason = %reason, "task handler panicked");
                    ResponseMessage::failed(task_id, RemoteError::new("Panic", reason), used_memory)
                }
            }
        }
        None => ResponseMessage::failed(
            task_id,
            RemoteError::new(
                "TypeError",
                format!(
                    "no handler registered for {}#{}",
                    message.filename, message.name
                ),
            ),
            used_memory,
        ),
    };
    port.post_response(response).is_ok()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|msg| (*msg).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "task handler panicked".to_owned())
}
