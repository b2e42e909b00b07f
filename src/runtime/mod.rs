//! Worker-side plumbing: wire protocol, channels, shared counters and the
//! OS-thread worker.

pub mod channel;
pub mod counters;
pub mod protocol;
pub mod thread_worker;
pub mod worker;

pub use channel::{message_channel, LocalSideChannel, MessagePort, WorkerPort, WorkerRequest};
pub use counters::{SharedCounters, FIELD_COUNT, REQUEST_COUNT_FIELD, RESPONSE_COUNT_FIELD};
pub use protocol::{RemoteError, RequestMessage, ResponseMessage, WorkerMessage};
pub use thread_worker::{HandlerRegistry, TaskContext, TaskHandler, ThreadWorker};
pub use worker::{SideChannel, SideChannelListener, Worker, WorkerInit};
