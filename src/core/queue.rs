//! Task queue abstraction.

use crate::core::task::TaskRecord;
use crate::util::serde::TaskId;

/// Holding area for tasks waiting for a free worker.
///
/// Queues own their records. Implementations may reorder what
/// [`shift`](TaskQueue::shift) returns (priority queues do), but must return
/// `None` when empty and treat removal of an absent task as a no-op.
pub trait TaskQueue: Send {
    /// Current number of queued tasks.
    fn len(&self) -> usize;

    /// Whether the queue is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a task. Never drops it.
    fn push(&mut self, task: TaskRecord);

    /// Remove and return the next task, or `None` if empty.
    fn shift(&mut self) -> Option<TaskRecord>;

    /// Remove a task by id, returning it if it was queued.
    fn remove(&mut self, task_id: TaskId) -> Option<TaskRecord>;
}
