//! Shared serializable scalar types.

use ::serde::{Deserialize, Serialize};

/// Task identifier, unique for the lifetime of the generator that issued it.
pub type TaskId = u64;

/// Identifier of a worker within a pool.
pub type WorkerId = u32;

/// Scheduling priority used by priority-ordered queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Background work.
    Low,
    /// Default priority.
    #[default]
    Normal,
    /// Ahead of normal work.
    High,
    /// Always first.
    Critical,
}
