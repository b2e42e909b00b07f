//! Interface of a worker execution unit, as seen by the coordinator.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::PoolError;
use crate::runtime::channel::WorkerPort;
use crate::util::serde::WorkerId;

/// Listener for side-channel messages.
pub type SideChannelListener = Box<dyn Fn(Value) + Send + Sync + 'static>;

/// Out-of-band channel a task may carry while it runs.
pub trait SideChannel: Send + Sync {
    /// Send a message to the other end.
    fn post_message(&self, message: Value);
    /// Subscribe to messages from the other end.
    fn on_message(&self, listener: SideChannelListener);
}

/// Everything a worker needs to start serving requests.
#[derive(Debug)]
pub struct WorkerInit {
    /// Pool-assigned worker id.
    pub worker_id: WorkerId,
    /// Worker side of the request/response channel.
    pub port: WorkerPort,
    /// Opaque data handed to the worker at startup.
    pub worker_data: Value,
}

impl WorkerInit {
    /// Minimal init for a worker id and port.
    #[must_use]
    pub fn new(worker_id: WorkerId, port: WorkerPort) -> Self {
        Self {
            worker_id,
            port,
            worker_data: Value::Null,
        }
    }
}

/// An independently running execution unit.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Name of the runtime backing this worker.
    fn runtime(&self) -> &str;

    /// Identifier of the underlying thread or process.
    fn thread_id(&self) -> u64;

    /// Start the worker. It must post [`WorkerMessage::Ready`] on its port
    /// once it accepts requests.
    ///
    /// [`WorkerMessage::Ready`]: crate::runtime::protocol::WorkerMessage::Ready
    ///
    /// # Errors
    ///
    /// Returns an error if the execution unit could not be started.
    fn initialize(&self, init: WorkerInit) -> Result<(), PoolError>;

    /// Stop the worker; completes once it has exited. Completes immediately
    /// if it already exited.
    async fn terminate(&self);

    /// Hand a task's side channel to the worker. Optional.
    fn set_channel(&self, _channel: Arc<dyn SideChannel>) {}

    /// Whether the worker keeps its host alive. Optional.
    fn set_referenced(&self, _referenced: bool) {}
}
