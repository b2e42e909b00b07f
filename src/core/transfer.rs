//! Transferable buffers and the movable task input wrapper.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

/// Owned buffer that can be moved across the worker boundary without a copy.
///
/// Clones share the same underlying slot. Posting the handle in a transfer
/// list detaches it: afterwards every clone on the sending side observes an
/// empty, detached buffer.
#[derive(Debug, Clone)]
pub struct TransferHandle {
    slot: Arc<Mutex<Option<Vec<u8>>>>,
}

impl TransferHandle {
    /// Wrap a buffer.
    #[must_use]
    pub fn new(buffer: Vec<u8>) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(buffer))),
        }
    }

    /// Whether the buffer was already moved out.
    #[must_use]
    pub fn is_detached(&self) -> bool {
        self.slot.lock().is_none()
    }

    /// Length of the buffer, or 0 once detached.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.slot.lock().as_ref().map_or(0, Vec::len)
    }

    /// Move the buffer out, leaving the handle detached.
    pub fn detach(&self) -> Option<Vec<u8>> {
        self.slot.lock().take()
    }

    /// Whether two handles refer to the same buffer.
    #[must_use]
    pub fn same_buffer(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }
}

/// Handles whose ownership moves with a request.
pub type TransferList = Vec<TransferHandle>;

/// Task input as supplied by the submitter.
#[derive(Debug, Clone)]
pub enum TaskInput {
    /// Plain value, copied across the boundary.
    Value(Value),
    /// Value whose backing buffers move with it.
    Movable {
        /// The value seen by the worker.
        value: Value,
        /// Buffers appended to the task's transfer list.
        transfer: TransferList,
    },
}

impl TaskInput {
    /// Mark `value` as movable together with its backing buffers.
    #[must_use]
    pub const fn movable(value: Value, transfer: TransferList) -> Self {
        Self::Movable { value, transfer }
    }

    /// Whether the input carries transferable buffers.
    #[must_use]
    pub const fn is_movable(&self) -> bool {
        matches!(self, Self::Movable { .. })
    }

    /// Split into the value and the buffers to transfer.
    #[must_use]
    pub fn into_parts(self) -> (Value, TransferList) {
        match self {
            Self::Value(value) => (value, Vec::new()),
            Self::Movable { value, transfer } => (value, transfer),
        }
    }
}

impl From<Value> for TaskInput {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}
