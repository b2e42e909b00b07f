//! Tests for cancellation signals and their adapters

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use nova_pool::core::{
    AbortController, AbortListener, CancelSignal, EventEmitter, EventEmitterSignal, EventTarget,
    ListenerId, PoolError, TaskOutcome, TaskRecord,
};
use parking_lot::Mutex;
use serde_json::json;

#[derive(Default)]
struct EmitterState {
    listeners: Mutex<Vec<(ListenerId, AbortListener)>>,
    next: AtomicU64,
    fired: AtomicBool,
}

/// Minimal emitter-shaped signal.
#[derive(Clone, Default)]
struct Emitter(Arc<EmitterState>);

impl Emitter {
    fn emit(&self) {
        self.0.fired.store(true, Ordering::SeqCst);
        let listeners = std::mem::take(&mut *self.0.listeners.lock());
        for (_, listener) in listeners {
            listener();
        }
    }

    fn listener_count(&self) -> usize {
        self.0.listeners.lock().len()
    }
}

impl EventEmitter for Emitter {
    fn once(&self, listener: AbortListener) -> ListenerId {
        let id = ListenerId(self.0.next.fetch_add(1, Ordering::SeqCst));
        self.0.listeners.lock().push((id, listener));
        id
    }

    fn off(&self, id: ListenerId) {
        self.0.listeners.lock().retain(|(registered, _)| *registered != id);
    }

    fn aborted(&self) -> bool {
        self.0.fired.load(Ordering::SeqCst)
    }
}

#[test]
fn test_abort_controller_fires_once() {
    let controller = AbortController::new();
    let signal = controller.signal();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    signal.add_event_listener(Box::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    controller.abort(Some("first".into()));
    controller.abort(Some("second".into()));
    assert!(signal.aborted());
    assert_eq!(signal.reason().as_deref(), Some("first"));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_removed_listener_does_not_fire() {
    let controller = AbortController::new();
    let signal = controller.signal().into_cancel_signal();
    let fired = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&fired);
    let id = signal.subscribe_once(Box::new(move || flag.store(true, Ordering::SeqCst)));
    signal.unsubscribe(id);
    controller.abort(None);
    assert!(!fired.load(Ordering::SeqCst));
}

#[test]
fn test_emitter_adapter_detaches_on_complete() {
    let emitter = Emitter::default();
    let signal: Arc<dyn CancelSignal> = Arc::new(EventEmitterSignal(emitter.clone()));
    let mut record = TaskRecord::new(1, json!(null), Vec::new(), "w", "n", Box::new(|_: TaskOutcome| {}))
        .with_cancel_signal(Arc::clone(&signal));
    let id = signal.subscribe_once(Box::new(|| {}));
    record.set_cancel_listener(id);
    assert_eq!(emitter.listener_count(), 1);

    record.complete(Ok(json!(1)));
    assert_eq!(emitter.listener_count(), 0);
}

#[test]
fn test_emitter_adapter_cancels_record() {
    let emitter = Emitter::default();
    let signal: Arc<dyn CancelSignal> = Arc::new(EventEmitterSignal(emitter.clone()));
    let outcome = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&outcome);
    let record = Arc::new(Mutex::new(Some(TaskRecord::new(
        2,
        json!(null),
        Vec::new(),
        "w",
        "n",
        Box::new(move |result| *sink.lock() = Some(result)),
    ))));
    let target = Arc::clone(&record);
    signal.subscribe_once(Box::new(move || {
        if let Some(mut record) = target.lock().take() {
            record.cancel();
        }
    }));

    emitter.emit();
    assert!(signal.aborted());
    assert_eq!(*outcome.lock(), Some(Err(PoolError::Cancelled)));
}
