//! Bidirectional request/response channel between the coordinator and one
//! worker, plus an in-process side channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use serde_json::Value;

use crate::core::transfer::TransferHandle;
use crate::core::PoolError;
use crate::runtime::counters::{SharedCounters, RESPONSE_COUNT_FIELD};
use crate::runtime::protocol::{RequestMessage, ResponseMessage, WorkerMessage};
use crate::runtime::worker::{SideChannel, SideChannelListener};

/// Request as delivered to the worker, with the buffers moved alongside it.
#[derive(Debug)]
pub struct WorkerRequest {
    /// The request.
    pub message: RequestMessage,
    /// Buffers detached from the sender's transfer list, in list order.
    pub transferred: Vec<Vec<u8>>,
}

/// Create a connected coordinator/worker port pair sharing one counter block.
#[must_use]
pub fn message_channel() -> (MessagePort, WorkerPort) {
    let (request_tx, request_rx) = unbounded();
    let (response_tx, response_rx) = unbounded();
    let counters = SharedCounters::new();
    let port = MessagePort {
        requests: Mutex::new(Some(request_tx)),
        responses: response_rx,
        counters: counters.clone(),
        referenced: AtomicBool::new(false),
    };
    let worker_port = WorkerPort {
        requests: request_rx,
        responses: response_tx,
        counters,
    };
    (port, worker_port)
}

/// Coordinator side of a worker channel.
#[derive(Debug)]
pub struct MessagePort {
    /// `None` once closed; dropping the sender ends the worker's receive loop.
    requests: Mutex<Option<Sender<WorkerRequest>>>,
    responses: Receiver<WorkerMessage>,
    counters: SharedCounters,
    referenced: AtomicBool,
}

impl MessagePort {
    /// Post a request, moving every buffer in `transfer_list` to the worker.
    ///
    /// # Errors
    ///
    /// Fails synchronously with [`PoolError::Dispatch`] when the port is
    /// closed, the worker is gone, or the transfer list names a detached
    /// buffer or the same buffer twice. Nothing is detached when validation
    /// fails.
    pub fn post_message(
        &self,
        message: RequestMessage,
        transfer_list: &[TransferHandle],
    ) -> Result<(), PoolError> {
        let requests = self.requests.lock();
        let Some(sender) = requests.as_ref() else {
            return Err(PoolError::Dispatch("port is closed".into()));
        };
        for (idx, handle) in transfer_list.iter().enumerate() {
            if handle.is_detached() {
                return Err(PoolError::Dispatch(
                    "transfer list contains a detached buffer".into(),
                ));
            }
            if transfer_list[..idx].iter().any(|prior| prior.same_buffer(handle)) {
                return Err(PoolError::Dispatch(
                    "transfer list contains the same buffer twice".into(),
                ));
            }
        }
        let transferred = transfer_list
            .iter()
            .filter_map(TransferHandle::detach)
            .collect();
        sender
            .send(WorkerRequest {
                message,
                transferred,
            })
            .map_err(|_| PoolError::Dispatch("worker channel disconnected".into()))
    }

    /// Non-blocking receive. Returns `None` when nothing is queued.
    #[must_use]
    pub fn try_receive(&self) -> Option<WorkerMessage> {
        self.responses.try_recv().ok()
    }

    /// Wait up to `timeout` for the next message.
    #[must_use]
    pub fn recv_timeout(&self, timeout: Duration) -> Option<WorkerMessage> {
        match self.responses.recv_timeout(timeout) {
            Ok(message) => Some(message),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Raw receiver, for selecting over several ports.
    #[must_use]
    pub const fn receiver(&self) -> &Receiver<WorkerMessage> {
        &self.responses
    }

    /// Counter block shared with the worker.
    #[must_use]
    pub const fn counters(&self) -> &SharedCounters {
        &self.counters
    }

    /// Close the request side. Idempotent.
    pub fn close(&self) {
        self.requests.lock().take();
    }

    /// Whether [`close`](Self::close) was called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.requests.lock().is_none()
    }

    /// Mark the port as keeping its owner alive.
    pub fn reference(&self) {
        self.referenced.store(true, Ordering::Release);
    }

    /// Clear the keep-alive mark.
    pub fn unreference(&self) {
        self.referenced.store(false, Ordering::Release);
    }

    /// Whether the port currently keeps its owner alive.
    #[must_use]
    pub fn is_referenced(&self) -> bool {
        self.referenced.load(Ordering::Acquire)
    }
}

/// Worker side of a worker channel.
#[derive(Debug)]
pub struct WorkerPort {
    requests: Receiver<WorkerRequest>,
    responses: Sender<WorkerMessage>,
    counters: SharedCounters,
}

impl WorkerPort {
    /// Block until a request arrives. `None` once the coordinator closed the
    /// port.
    #[must_use]
    pub fn recv(&self) -> Option<WorkerRequest> {
        self.requests.recv().ok()
    }

    /// Raw request receiver, for selecting alongside other channels.
    #[must_use]
    pub const fn requests(&self) -> &Receiver<WorkerRequest> {
        &self.requests
    }

    /// Announce readiness.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::PoolShutdown`] if the coordinator is gone.
    pub fn post_ready(&self) -> Result<(), PoolError> {
        self.responses
            .send(WorkerMessage::Ready)
            .map_err(|_| PoolError::PoolShutdown)
    }

    /// Post a response, then bump the response counter so a draining
    /// coordinator sees it.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::PoolShutdown`] if the coordinator is gone.
    pub fn post_response(&self, response: ResponseMessage) -> Result<(), PoolError> {
        self.responses
            .send(WorkerMessage::Response(response))
            .map_err(|_| PoolError::PoolShutdown)?;
        self.counters.add_and_notify(RESPONSE_COUNT_FIELD);
        Ok(())
    }

    /// Counter block shared with the coordinator.
    #[must_use]
    pub const fn counters(&self) -> &SharedCounters {
        &self.counters
    }
}

type ListenerList = Arc<Mutex<Vec<SideChannelListener>>>;

/// One end of an in-process side channel. Messages are delivered to the
/// peer's listeners on the posting thread.
#[derive(Clone)]
pub struct LocalSideChannel {
    own: ListenerList,
    peer: ListenerList,
}

impl LocalSideChannel {
    /// Create two connected ends.
    #[must_use]
    pub fn pair() -> (Self, Self) {
        let left: ListenerList = Arc::default();
        let right: ListenerList = Arc::default();
        (
            Self {
                own: Arc::clone(&left),
                peer: Arc::clone(&right),
            },
            Self {
                own: right,
                peer: left,
            },
        )
    }
}

impl SideChannel for LocalSideChannel {
    fn post_message(&self, message: Value) {
        for listener in self.peer.lock().iter() {
            listener(message.clone());
        }
    }

    fn on_message(&self, listener: SideChannelListener) {
        self.own.lock().push(listener);
    }
}

impl std::fmt::Debug for LocalSideChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSideChannel")
            .field("listeners", &self.own.lock().len())
            .finish()
    }
}
