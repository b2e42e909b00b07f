//! Pool of resources that become usable only after an asynchronous setup.
//!
//! Resources start out pending. When a resource's [`Readiness`] fires, the
//! pool moves it to the ready set and tells availability subscribers about
//! it. Scheduling asks [`ResourcePool::find_available`] for the least loaded
//! ready resource below the usage ceiling.
//!
//! Usage is a load-balancing heuristic, not a reservation: two lookups in a
//! row can both return the same resource before either dispatch lands.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::debug;

/// Usage reported by a resource that must not receive more work.
pub const INFINITE_USAGE: usize = usize::MAX;

/// Listener run once when a resource becomes ready.
pub type ReadyListener = Box<dyn FnOnce() + Send + 'static>;

/// Listener run when a resource drops below the usage ceiling.
pub type AvailabilityListener<T> = Arc<dyn Fn(&Arc<T>) + Send + Sync + 'static>;

/// Two-state readiness gate: pending with a listener list, or ready.
pub struct Readiness {
    /// `None` once ready.
    listeners: Mutex<Option<Vec<ReadyListener>>>,
}

impl Readiness {
    /// New gate in the pending state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Some(Vec::new())),
        }
    }

    /// Transition to ready and run every pending listener once, outside the
    /// lock. Returns `false` if the gate was already ready.
    pub fn mark_ready(&self) -> bool {
        let Some(listeners) = self.listeners.lock().take() else {
            return false;
        };
        for listener in listeners {
            listener();
        }
        true
    }

    /// Whether the gate is ready.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.listeners.lock().is_none()
    }

    /// Run `listener` once the gate is ready; immediately if it already is.
    pub fn on_ready(&self, listener: ReadyListener) {
        {
            let mut listeners = self.listeners.lock();
            if let Some(pending) = listeners.as_mut() {
                pending.push(listener);
                return;
            }
        }
        listener();
    }
}

impl Default for Readiness {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Readiness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Readiness")
            .field("ready", &self.is_ready())
            .finish()
    }
}

/// A resource gated on asynchronous setup that reports its current load.
pub trait AsyncResource: Send + Sync + 'static {
    /// The resource's readiness gate.
    fn readiness(&self) -> &Readiness;

    /// Current load; [`INFINITE_USAGE`] when it must not receive work.
    fn current_usage(&self) -> usize;
}

struct Members<T> {
    /// Pending and ready are disjoint. Both keep insertion order.
    pending: Vec<Arc<T>>,
    ready: Vec<Arc<T>>,
}

impl<T> Members<T> {
    fn position(list: &[Arc<T>], item: &Arc<T>) -> Option<usize> {
        list.iter().position(|member| Arc::ptr_eq(member, item))
    }
}

struct PoolInner<T> {
    members: Mutex<Members<T>>,
    maximum_usage: AtomicUsize,
    listeners: Mutex<Vec<AvailabilityListener<T>>>,
}

impl<T: AsyncResource> PoolInner<T> {
    fn promote(&self, item: &Arc<T>) -> bool {
        let mut members = self.members.lock();
        let Some(idx) = Members::position(&members.pending, item) else {
            return false;
        };
        let item = members.pending.remove(idx);
        members.ready.push(item);
        true
    }

    fn maybe_available(&self, item: &Arc<T>) {
        if item.current_usage() >= self.maximum_usage.load(Ordering::Acquire) {
            return;
        }
        let listeners = self.listeners.lock().clone();
        for listener in &listeners {
            listener(item);
        }
    }
}

/// Collection of readiness-gated resources with least-usage selection.
///
/// Cloning yields another handle to the same pool.
pub struct ResourcePool<T> {
    inner: Arc<PoolInner<T>>,
}

impl<T> Clone for ResourcePool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: AsyncResource> ResourcePool<T> {
    /// Create a pool whose resources saturate at `maximum_usage`.
    #[must_use]
    pub fn new(maximum_usage: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                members: Mutex::new(Members {
                    pending: Vec::new(),
                    ready: Vec::new(),
                }),
                maximum_usage: AtomicUsize::new(maximum_usage),
                listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Usage ceiling.
    #[must_use]
    pub fn maximum_usage(&self) -> usize {
        self.inner.maximum_usage.load(Ordering::Acquire)
    }

    /// Change the usage ceiling.
    pub fn set_maximum_usage(&self, maximum_usage: usize) {
        self.inner.maximum_usage.store(maximum_usage, Ordering::Release);
    }

    /// Track a resource as pending; it moves to ready when its gate fires.
    pub fn add(&self, item: Arc<T>) {
        self.inner.members.lock().pending.push(Arc::clone(&item));
        let pool: Weak<PoolInner<T>> = Arc::downgrade(&self.inner);
        let resource: Weak<T> = Arc::downgrade(&item);
        item.readiness().on_ready(Box::new(move || {
            let (Some(pool), Some(resource)) = (pool.upgrade(), resource.upgrade()) else {
                return;
            };
            if pool.promote(&resource) {
                debug!("resource became ready");
                pool.maybe_available(&resource);
            }
        }));
    }

    /// Stop tracking a resource. No-op if absent.
    pub fn remove(&self, item: &Arc<T>) {
        let mut members = self.inner.members.lock();
        if let Some(idx) = Members::position(&members.pending, item) {
            members.pending.remove(idx);
        } else if let Some(idx) = Members::position(&members.ready, item) {
            members.ready.remove(idx);
        }
    }

    /// Whether the resource is tracked.
    #[must_use]
    pub fn contains(&self, item: &Arc<T>) -> bool {
        let members = self.inner.members.lock();
        Members::position(&members.pending, item).is_some()
            || Members::position(&members.ready, item).is_some()
    }

    /// Least loaded ready resource strictly below the ceiling.
    ///
    /// An idle resource is returned as soon as it is seen. Among equal
    /// non-zero usages the earliest in ready order wins.
    #[must_use]
    pub fn find_available(&self) -> Option<Arc<T>> {
        let members = self.inner.members.lock();
        let mut min_usage = self.maximum_usage();
        let mut candidate = None;
        for item in &members.ready {
            let usage = item.current_usage();
            if usage == 0 {
                return Some(Arc::clone(item));
            }
            if usage < min_usage {
                min_usage = usage;
                candidate = Some(item);
            }
        }
        candidate.map(Arc::clone)
    }

    /// Notify availability subscribers if `item` is below the ceiling.
    pub fn maybe_available(&self, item: &Arc<T>) {
        self.inner.maybe_available(item);
    }

    /// Subscribe to availability events for the pool's lifetime.
    pub fn on_available(&self, listener: AvailabilityListener<T>) {
        self.inner.listeners.lock().push(listener);
    }

    /// Pending plus ready count.
    #[must_use]
    pub fn len(&self) -> usize {
        let members = self.inner.members.lock();
        members.pending.len() + members.ready.len()
    }

    /// Whether nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of pending resources.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.inner.members.lock().pending.len()
    }

    /// Number of ready resources.
    #[must_use]
    pub fn ready_len(&self) -> usize {
        self.inner.members.lock().ready.len()
    }

    /// Snapshot of every tracked resource, pending first, then ready.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<T>> {
        let members = self.inner.members.lock();
        members
            .pending
            .iter()
            .chain(members.ready.iter())
            .cloned()
            .collect()
    }

    /// Iterate over a snapshot, pending first, then ready.
    pub fn iter(&self) -> impl Iterator<Item = Arc<T>> {
        self.snapshot().into_iter()
    }
}

impl<T: AsyncResource> std::fmt::Debug for ResourcePool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourcePool")
            .field("pending", &self.pending_len())
            .field("ready", &self.ready_len())
            .field("maximum_usage", &self.maximum_usage())
            .finish()
    }
}
