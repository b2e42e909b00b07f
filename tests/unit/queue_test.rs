//! Tests for queue backends, including randomized operation sequences

use nova_pool::core::{TaskOutcome, TaskQueue, TaskRecord};
use nova_pool::infra::{ArrayTaskQueue, PriorityTaskQueue};
use nova_pool::util::{Priority, TaskId};
use rand::Rng;
use serde_json::Value;

fn make_task(id: TaskId) -> TaskRecord {
    TaskRecord::new(id, Value::Null, Vec::new(), "worker.js", "default", Box::new(|_: TaskOutcome| {}))
}

/// Push/shift/remove at random and check the size invariant after every step.
fn exercise(queue: &mut dyn TaskQueue, fifo: bool) {
    let mut rng = rand::rng();
    let mut model: Vec<TaskId> = Vec::new();
    let mut next_id: TaskId = 0;

    for _ in 0..500 {
        match rng.random_range(0..3) {
            0 => {
                queue.push(make_task(next_id));
                model.push(next_id);
                next_id += 1;
            }
            1 => {
                let shifted = queue.shift().map(|task| task.task_id());
                if model.is_empty() {
                    assert!(shifted.is_none());
                } else {
                    let id = shifted.unwrap();
                    if fifo {
                        assert_eq!(id, model[0]);
                    }
                    model.retain(|queued| *queued != id);
                }
            }
            _ => {
                let target = rng.random_range(0..=next_id);
                let removed = queue.remove(target).map(|task| task.task_id());
                if model.contains(&target) {
                    assert_eq!(removed, Some(target));
                    model.retain(|queued| *queued != target);
                } else {
                    assert!(removed.is_none());
                }
            }
        }
        assert_eq!(queue.len(), model.len());
        assert_eq!(queue.is_empty(), model.is_empty());
    }
}

#[test]
fn test_array_queue_random_sequences() {
    for _ in 0..20 {
        exercise(&mut ArrayTaskQueue::new(), true);
    }
}

#[test]
fn test_priority_queue_random_sequences() {
    for _ in 0..20 {
        exercise(&mut PriorityTaskQueue::new(), true);
    }
}

#[test]
fn test_shift_on_empty() {
    let mut fifo = ArrayTaskQueue::new();
    let mut prio = PriorityTaskQueue::new();
    assert!(fifo.shift().is_none());
    assert!(prio.shift().is_none());
}

#[test]
fn test_remove_absent_keeps_size() {
    let mut queue = ArrayTaskQueue::new();
    queue.push(make_task(1));
    queue.push(make_task(2));
    assert!(queue.remove(99).is_none());
    assert_eq!(queue.len(), 2);
}

#[test]
fn test_priority_overtakes_fifo() {
    let mut queue = PriorityTaskQueue::new();
    queue.push(make_task(1));
    queue.push(make_task(2).with_priority(Priority::High));
    queue.push(make_task(3).with_priority(Priority::Low));
    let order: Vec<TaskId> = std::iter::from_fn(|| queue.shift().map(|t| t.task_id())).collect();
    assert_eq!(order, vec![2, 1, 3]);
}
