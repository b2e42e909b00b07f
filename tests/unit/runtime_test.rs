//! Tests for the wire protocol, shared counters and channels

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use nova_pool::core::{PoolError, TransferHandle};
use nova_pool::runtime::{
    message_channel, LocalSideChannel, RemoteError, RequestMessage, ResponseMessage, SharedCounters,
    SideChannel, WorkerMessage, FIELD_COUNT, REQUEST_COUNT_FIELD, RESPONSE_COUNT_FIELD,
};
use parking_lot::Mutex;
use serde_json::json;

#[test]
fn test_counter_layout() {
    assert_eq!(REQUEST_COUNT_FIELD, 0);
    assert_eq!(RESPONSE_COUNT_FIELD, 1);
    assert!(FIELD_COUNT >= 2);
}

#[test]
fn test_wait_for_change_wakes_on_increment() {
    let counters = SharedCounters::new();
    let producer = counters.clone();
    let waiter = thread::spawn(move || counters.wait_for_change(RESPONSE_COUNT_FIELD, 0, Duration::from_secs(5)));
    thread::sleep(Duration::from_millis(10));
    assert_eq!(producer.add_and_notify(RESPONSE_COUNT_FIELD), 1);
    assert_eq!(waiter.join().unwrap(), 1);
}

#[test]
fn test_wait_for_change_times_out() {
    let counters = SharedCounters::new();
    assert_eq!(
        counters.wait_for_change(REQUEST_COUNT_FIELD, 0, Duration::from_millis(10)),
        0
    );
}

#[test]
fn test_worker_message_wire_shape() {
    let ready = serde_json::to_value(WorkerMessage::Ready).unwrap();
    assert_eq!(ready, json!({"type": "ready"}));

    let response = WorkerMessage::Response(ResponseMessage::failed(
        4,
        RemoteError::new("Error", "bad"),
        16,
    ));
    let wire = serde_json::to_value(&response).unwrap();
    assert_eq!(wire["type"], "response");
    assert_eq!(wire["taskId"], 4);
    assert_eq!(wire["error"]["name"], "Error");
    assert_eq!(wire["usedMemory"], 16);
}

#[test]
fn test_remote_error_from_anyhow() {
    let err: RemoteError = anyhow::anyhow!("inner").context("outer").into();
    assert_eq!(err.name, "Error");
    assert!(err.message.contains("outer"));
    assert!(err.message.contains("inner"));
}

#[test]
fn test_detached_buffer_rejected() {
    let (port, _worker) = message_channel();
    let buf = TransferHandle::new(vec![1, 2, 3]);
    assert_eq!(buf.detach(), Some(vec![1, 2, 3]));
    let request = RequestMessage {
        task_id: 1,
        task: json!(null),
        filename: "worker.js".into(),
        name: "default".into(),
    };
    assert!(matches!(
        port.post_message(request, &[buf]),
        Err(PoolError::Dispatch(_))
    ));
}

#[test]
fn test_closed_port_rejects_posts() {
    let (port, _worker) = message_channel();
    port.close();
    let request = RequestMessage {
        task_id: 1,
        task: json!(null),
        filename: "worker.js".into(),
        name: "default".into(),
    };
    assert!(matches!(port.post_message(request, &[]), Err(PoolError::Dispatch(_))));
}

#[test]
fn test_side_channel_is_bidirectional() {
    let (left, right) = LocalSideChannel::pair();
    let from_right = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&from_right);
    left.on_message(Box::new(move |msg| sink.lock().push(msg)));
    right.post_message(json!({"progress": 50}));
    assert_eq!(*from_right.lock(), vec![json!({"progress": 50})]);
}
