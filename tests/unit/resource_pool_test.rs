//! Tests for least-usage selection over real worker handles

use std::sync::Arc;

use async_trait::async_trait;
use nova_pool::core::{
    AbortController, AsyncResource, PoolError, ResourcePool, TaskOutcome, TaskRecord, WorkerHandle,
    INFINITE_USAGE,
};
use nova_pool::runtime::{message_channel, ResponseMessage, Worker, WorkerInit, WorkerPort};
use serde_json::json;

struct IdleWorker;

#[async_trait]
impl Worker for IdleWorker {
    fn runtime(&self) -> &str {
        "idle"
    }

    fn thread_id(&self) -> u64 {
        0
    }

    fn initialize(&self, _init: WorkerInit) -> Result<(), PoolError> {
        Ok(())
    }

    async fn terminate(&self) {}
}

fn handle(worker_id: u32) -> (Arc<WorkerHandle>, WorkerPort) {
    let (port, worker_port) = message_channel();
    let handle = WorkerHandle::new(
        Arc::new(IdleWorker),
        port,
        worker_id,
        Box::new(|| {}),
        Arc::new(|_: &ResponseMessage| {}),
    );
    (Arc::new(handle), worker_port)
}

fn task(task_id: u64) -> TaskRecord {
    TaskRecord::new(task_id, json!(null), Vec::new(), "worker.js", "default", Box::new(|_: TaskOutcome| {}))
}

#[test]
fn test_pending_handles_are_never_selected() {
    let pool = ResourcePool::new(4);
    let (a, _pa) = handle(0);
    pool.add(Arc::clone(&a));
    assert!(pool.find_available().is_none());
    a.mark_ready();
    assert_eq!(pool.find_available().unwrap().worker_id(), 0);
}

#[test]
fn test_selects_idle_then_least_loaded() {
    let pool = ResourcePool::new(4);
    let (busy, _pb) = handle(0);
    let (light, _pl) = handle(1);
    for h in [&busy, &light] {
        pool.add(Arc::clone(h));
        h.mark_ready();
    }
    busy.dispatch(task(1));
    busy.dispatch(task(2));
    assert_eq!(pool.find_available().unwrap().worker_id(), 1);

    light.dispatch(task(3));
    assert_eq!(pool.find_available().unwrap().worker_id(), 1);
}

#[test]
fn test_abortable_handle_is_skipped() {
    let pool = ResourcePool::new(4);
    let (h, _port) = handle(0);
    pool.add(Arc::clone(&h));
    h.mark_ready();

    let controller = AbortController::new();
    h.dispatch(task(1).with_cancel_signal(controller.signal().into_cancel_signal()));
    assert_eq!(h.current_usage(), INFINITE_USAGE);
    assert!(pool.find_available().is_none());
}

#[test]
fn test_saturated_handles_return_none() {
    let pool = ResourcePool::new(1);
    let (h, _port) = handle(0);
    pool.add(Arc::clone(&h));
    h.mark_ready();
    h.dispatch(task(1));
    assert!(pool.find_available().is_none());

    pool.set_maximum_usage(2);
    assert_eq!(pool.maximum_usage(), 2);
    assert!(pool.find_available().is_some());
}
