//! Infrastructure adapters: task queue backends.

pub mod queue;

pub use queue::{ArrayTaskQueue, PriorityTaskQueue};
