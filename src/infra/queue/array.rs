//! Default FIFO queue.

use std::collections::VecDeque;

use crate::core::{TaskQueue, TaskRecord};
use crate::util::serde::TaskId;

/// Strict FIFO queue backed by a ring buffer.
#[derive(Debug, Default)]
pub struct ArrayTaskQueue {
    tasks: VecDeque<TaskRecord>,
}

impl ArrayTaskQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TaskQueue for ArrayTaskQueue {
    fn len(&self) -> usize {
        self.tasks.len()
    }

    fn push(&mut self, task: TaskRecord) {
        self.tasks.push_back(task);
    }

    fn shift(&mut self) -> Option<TaskRecord> {
        self.tasks.pop_front()
    }

    fn remove(&mut self, task_id: TaskId) -> Option<TaskRecord> {
        let idx = self.tasks.iter().position(|task| task.task_id() == task_id)?;
        self.tasks.remove(idx)
    }
}
