//! Configuration models for the pool front.

pub mod pool;

pub use pool::{MaxQueue, PoolConfig, QueueKind};
