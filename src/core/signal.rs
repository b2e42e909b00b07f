//! Cancellation signals.
//!
//! The pool only talks to [`CancelSignal`]. Signals come in two shapes in the
//! wild: event-target style (`add_event_listener` / `remove_event_listener`)
//! and emitter style (`once` / `off`). Each shape gets an adapter at the
//! boundary so the core never branches on it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Listener invoked when a signal aborts.
pub type AbortListener = Box<dyn FnOnce() + Send + 'static>;

/// Registration returned by a signal, used to detach the listener again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Signal a task can be bound to.
pub trait CancelSignal: Send + Sync {
    /// Whether the signal already fired.
    fn aborted(&self) -> bool;
    /// Register a listener that runs at most once, when the signal fires.
    fn subscribe_once(&self, listener: AbortListener) -> ListenerId;
    /// Detach a listener. Unknown ids are ignored.
    fn unsubscribe(&self, id: ListenerId);
}

/// Event-target shaped signal.
pub trait EventTarget: Send + Sync {
    /// Whether the signal already fired.
    fn aborted(&self) -> bool;
    /// Register an abort listener.
    fn add_event_listener(&self, listener: AbortListener) -> ListenerId;
    /// Remove an abort listener.
    fn remove_event_listener(&self, id: ListenerId);
}

/// Emitter shaped signal.
pub trait EventEmitter: Send + Sync {
    /// Register a one-shot abort listener.
    fn once(&self, listener: AbortListener) -> ListenerId;
    /// Remove an abort listener.
    fn off(&self, id: ListenerId);
    /// Emitters usually expose no state; override when they do.
    fn aborted(&self) -> bool {
        false
    }
}

/// Adapts an [`EventTarget`] to [`CancelSignal`].
#[derive(Debug, Clone)]
pub struct EventTargetSignal<S>(pub S);

impl<S: EventTarget> CancelSignal for EventTargetSignal<S> {
    fn aborted(&self) -> bool {
        self.0.aborted()
    }

    fn subscribe_once(&self, listener: AbortListener) -> ListenerId {
        self.0.add_event_listener(listener)
    }

    fn unsubscribe(&self, id: ListenerId) {
        self.0.remove_event_listener(id);
    }
}

/// Adapts an [`EventEmitter`] to [`CancelSignal`].
#[derive(Debug, Clone)]
pub struct EventEmitterSignal<S>(pub S);

impl<S: EventEmitter> CancelSignal for EventEmitterSignal<S> {
    fn aborted(&self) -> bool {
        self.0.aborted()
    }

    fn subscribe_once(&self, listener: AbortListener) -> ListenerId {
        self.0.once(listener)
    }

    fn unsubscribe(&self, id: ListenerId) {
        self.0.off(id);
    }
}

#[derive(Default)]
struct SignalState {
    aborted: bool,
    reason: Option<String>,
    listeners: Vec<(ListenerId, AbortListener)>,
}

#[derive(Default)]
struct SignalInner {
    state: Mutex<SignalState>,
    next_listener: AtomicU64,
}

/// Event-target style abort signal, fired by its [`AbortController`].
#[derive(Clone, Default)]
pub struct AbortSignal {
    inner: Arc<SignalInner>,
}

impl AbortSignal {
    /// Abort reason, if one was given.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.inner.state.lock().reason.clone()
    }

    /// Number of attached listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.state.lock().listeners.len()
    }

    /// Wrap in the event-target adapter for use with the pool.
    #[must_use]
    pub fn into_cancel_signal(self) -> Arc<dyn CancelSignal> {
        Arc::new(EventTargetSignal(self))
    }
}

impl EventTarget for AbortSignal {
    fn aborted(&self) -> bool {
        self.inner.state.lock().aborted
    }

    /// Listeners added after the signal fired are never invoked.
    fn add_event_listener(&self, listener: AbortListener) -> ListenerId {
        let id = ListenerId(self.inner.next_listener.fetch_add(1, Ordering::Relaxed));
        let mut state = self.inner.state.lock();
        if !state.aborted {
            state.listeners.push((id, listener));
        }
        id
    }

    fn remove_event_listener(&self, id: ListenerId) {
        self.inner
            .state
            .lock()
            .listeners
            .retain(|(registered, _)| *registered != id);
    }
}

impl std::fmt::Debug for AbortSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("AbortSignal")
            .field("aborted", &state.aborted)
            .field("listeners", &state.listeners.len())
            .finish()
    }
}

/// Owner of an [`AbortSignal`].
#[derive(Debug, Clone, Default)]
pub struct AbortController {
    signal: AbortSignal,
}

impl AbortController {
    /// New controller with an unfired signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The controlled signal.
    #[must_use]
    pub fn signal(&self) -> AbortSignal {
        self.signal.clone()
    }

    /// Fire the signal. Listeners run once, outside the signal's lock.
    /// Later calls are ignored.
    pub fn abort(&self, reason: Option<String>) {
        let listeners = {
            let mut state = self.signal.inner.state.lock();
            if state.aborted {
                return;
            }
            state.aborted = true;
            state.reason = reason;
            std::mem::take(&mut state.listeners)
        };
        for (_, listener) in listeners {
            listener();
        }
    }
}
