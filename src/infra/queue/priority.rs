//! Priority-ordered queue.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::core::{TaskQueue, TaskRecord};
use crate::util::serde::TaskId;

/// Heap entry ordered by priority (highest first), then FIFO by push order.
struct PriorityTask {
    seq: u64,
    task: TaskRecord,
}

impl PartialEq for PriorityTask {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for PriorityTask {}

impl PartialOrd for PriorityTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PriorityTask {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.task.priority().cmp(&other.task.priority()) {
            // Earlier push wins; reversed for the max-heap.
            Ordering::Equal => other.seq.cmp(&self.seq),
            other => other,
        }
    }
}

/// Queue that shifts the highest-priority task first, FIFO within a
/// priority. O(log n) push and shift, O(n) remove.
#[derive(Default)]
pub struct PriorityTaskQueue {
    tasks: BinaryHeap<PriorityTask>,
    next_seq: u64,
}

impl PriorityTaskQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TaskQueue for PriorityTaskQueue {
    fn len(&self) -> usize {
        self.tasks.len()
    }

    fn push(&mut self, task: TaskRecord) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.tasks.push(PriorityTask { seq, task });
    }

    fn shift(&mut self) -> Option<TaskRecord> {
        self.tasks.pop().map(|entry| entry.task)
    }

    fn remove(&mut self, task_id: TaskId) -> Option<TaskRecord> {
        if !self.tasks.iter().any(|entry| entry.task.task_id() == task_id) {
            return None;
        }
        let mut entries = std::mem::take(&mut self.tasks).into_vec();
        let idx = entries
            .iter()
            .position(|entry| entry.task.task_id() == task_id)?;
        let removed = entries.swap_remove(idx);
        self.tasks = BinaryHeap::from(entries);
        Some(removed.task)
    }
}

impl std::fmt::Debug for PriorityTaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriorityTaskQueue")
            .field("len", &self.tasks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TaskOutcome;
    use crate::util::serde::Priority;
    use serde_json::Value;

    fn make_task(id: TaskId, priority: Priority) -> TaskRecord {
        TaskRecord::new(id, Value::Null, Vec::new(), "worker.js", "default", Box::new(|_: TaskOutcome| {}))
            .with_priority(priority)
    }

    #[test]
    fn test_priority_ordering() {
        let mut q = PriorityTaskQueue::new();
        q.push(make_task(1, Priority::Low));
        q.push(make_task(2, Priority::Critical));
        q.push(make_task(3, Priority::Normal));
        q.push(make_task(4, Priority::High));

        assert_eq!(q.shift().unwrap().task_id(), 2);
        assert_eq!(q.shift().unwrap().task_id(), 4);
        assert_eq!(q.shift().unwrap().task_id(), 3);
        assert_eq!(q.shift().unwrap().task_id(), 1);
    }

    #[test]
    fn test_fifo_within_priority() {
        let mut q = PriorityTaskQueue::new();
        q.push(make_task(30, Priority::Normal));
        q.push(make_task(10, Priority::Normal));
        q.push(make_task(20, Priority::Normal));

        assert_eq!(q.shift().unwrap().task_id(), 30);
        assert_eq!(q.shift().unwrap().task_id(), 10);
        assert_eq!(q.shift().unwrap().task_id(), 20);
    }

    #[test]
    fn test_remove_keeps_heap_order() {
        let mut q = PriorityTaskQueue::new();
        q.push(make_task(1, Priority::High));
        q.push(make_task(2, Priority::Low));
        q.push(make_task(3, Priority::Critical));

        assert_eq!(q.remove(1).unwrap().task_id(), 1);
        assert!(q.remove(1).is_none());
        assert_eq!(q.len(), 2);
        assert_eq!(q.shift().unwrap().task_id(), 3);
        assert_eq!(q.shift().unwrap().task_id(), 2);
    }

    #[test]
    fn test_empty_queue() {
        let mut q = PriorityTaskQueue::new();
        assert!(q.shift().is_none());
        assert_eq!(q.len(), 0);
    }
}
