//! Tests for worker handle dispatch, completion and teardown

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nova_pool::core::{AsyncResource, PoolError, TaskOutcome, TaskRecord, WorkerHandle, INFINITE_USAGE};
use nova_pool::runtime::{message_channel, ResponseMessage, Worker, WorkerInit, WorkerPort};
use parking_lot::Mutex;
use serde_json::json;

struct QuietWorker;

#[async_trait]
impl Worker for QuietWorker {
    fn runtime(&self) -> &str {
        "quiet"
    }

    fn thread_id(&self) -> u64 {
        7
    }

    fn initialize(&self, _init: WorkerInit) -> Result<(), PoolError> {
        Ok(())
    }

    async fn terminate(&self) {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

type Outcomes = Arc<Mutex<Vec<TaskOutcome>>>;

fn setup() -> (WorkerHandle, WorkerPort) {
    let (port, worker_port) = message_channel();
    let handle = WorkerHandle::new(
        Arc::new(QuietWorker),
        port,
        1,
        Box::new(|| {}),
        Arc::new(|_: &ResponseMessage| {}),
    );
    handle.mark_ready();
    (handle, worker_port)
}

fn record(task_id: u64, outcomes: &Outcomes) -> TaskRecord {
    let sink = Arc::clone(outcomes);
    TaskRecord::new(
        task_id,
        json!({"x": 1}),
        Vec::new(),
        "worker.js",
        "default",
        Box::new(move |outcome| sink.lock().push(outcome)),
    )
}

#[test]
fn test_example_round_trip() {
    let (handle, worker_port) = setup();
    let outcomes = Outcomes::default();
    handle.dispatch(record(42, &outcomes));

    let request = worker_port.recv().unwrap();
    assert_eq!(request.message.filename, "worker.js");
    assert_eq!(request.message.task, json!({"x": 1}));

    let wire = r#"{"taskId":42,"result":{"y":2},"error":null,"usedMemory":1024}"#;
    let response: ResponseMessage = serde_json::from_str(wire).unwrap();
    worker_port.post_response(response).unwrap();

    assert_eq!(handle.drain_pending_responses(), 1);
    assert_eq!(*outcomes.lock(), vec![Ok(json!({"y": 2}))]);
    assert_eq!(handle.used_memory(), 1024);
}

#[test]
fn test_unknown_response_is_ignored() {
    let (handle, worker_port) = setup();
    worker_port
        .post_response(ResponseMessage::ok(99, json!(null), 0))
        .unwrap();
    assert_eq!(handle.drain_pending_responses(), 1);
    assert_eq!(handle.in_flight_count(), 0);
}

#[test]
fn test_dispatch_records_worker_and_start() {
    let (handle, worker_port) = setup();
    let outcomes = Outcomes::default();
    handle.dispatch(record(1, &outcomes));
    assert!(handle.is_tracking(1));
    assert_eq!(worker_port.counters().load(nova_pool::runtime::REQUEST_COUNT_FIELD), 1);
}

#[test]
fn test_recycle_flag_blocks_new_work() {
    let (handle, _worker_port) = setup();
    assert!(!handle.should_recycle());
    assert_eq!(handle.current_usage(), 0);

    handle.set_should_recycle(true);
    assert!(handle.should_recycle());
    assert_eq!(handle.current_usage(), INFINITE_USAGE);

    handle.set_should_recycle(false);
    assert_eq!(handle.current_usage(), 0);
}

#[tokio::test]
async fn test_teardown_with_two_in_flight() {
    let (handle, _worker_port) = setup();
    let outcomes = Outcomes::default();
    handle.dispatch(record(1, &outcomes));
    handle.dispatch(record(2, &outcomes));

    handle.teardown(Some(Duration::from_secs(1))).await.unwrap();
    assert_eq!(
        *outcomes.lock(),
        vec![Err(PoolError::ThreadTermination), Err(PoolError::ThreadTermination)]
    );
    assert_eq!(handle.in_flight_count(), 0);

    handle.teardown(Some(Duration::from_secs(1))).await.unwrap();
    assert_eq!(outcomes.lock().len(), 2);
    assert!(handle.is_terminated());
}
