//! # Nova Pool
//!
//! A task-execution pool that spreads units of work over a bounded set of
//! independently running workers, balances load across them, and completes
//! every submitted task exactly once: with a result, an error, a
//! cancellation, or a termination failure.
//!
//! ## Pieces
//!
//! - [`core::TaskRecord`]: one submitted task bound to its completion
//!   callback and optional cancellation signal.
//! - [`core::WorkerHandle`]: coordinator-side view of one worker. Owns the
//!   channel and the in-flight map, drains responses when the shared
//!   response counter moves, and tears the worker down.
//! - [`core::ResourcePool`]: readiness-gated resources with least-usage
//!   selection and availability callbacks.
//! - [`core::TaskQueue`]: holding area for tasks waiting on capacity, with
//!   FIFO ([`infra::ArrayTaskQueue`]) and priority
//!   ([`infra::PriorityTaskQueue`]) backends.
//! - [`core::NovaPool`]: thin front tying the pieces together.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use nova_pool::config::PoolConfig;
//! use nova_pool::core::{NovaPool, RunOptions};
//! use nova_pool::runtime::{HandlerRegistry, TaskContext, ThreadWorker};
//! use serde_json::{json, Value};
//!
//! let registry = HandlerRegistry::new().with_handler(
//!     "math",
//!     "double",
//!     |payload: Value, _ctx: &TaskContext| -> anyhow::Result<Value> {
//!         Ok(json!({ "y": payload["x"].as_i64().unwrap_or(0) * 2 }))
//!     },
//! );
//!
//! let pool = NovaPool::new(PoolConfig::new().with_filename("math"))?;
//! pool.add_worker(Arc::new(ThreadWorker::new(registry)))?;
//!
//! pool.run(
//!     json!({ "x": 1 }),
//!     RunOptions::default().with_name("double"),
//!     |outcome| println!("{outcome:?}"),
//! )?;
//!
//! // Drive the coordinator.
//! pool.pump(Duration::from_millis(50));
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Configuration models for the pool front.
pub mod config;
/// Core scheduling abstractions: tasks, worker handles, resource pool.
pub mod core;
/// Infrastructure adapters: task queue backends.
pub mod infra;
/// Worker interface, wire protocol and channels.
pub mod runtime;
/// Shared utilities.
pub mod util;
