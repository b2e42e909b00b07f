//! Queue backends.

pub mod array;
pub mod priority;

pub use array::ArrayTaskQueue;
pub use priority::PriorityTaskQueue;
