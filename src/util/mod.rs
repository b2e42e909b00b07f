pub mod serde;
pub mod telemetry;

pub use self::serde::{Priority, TaskId, WorkerId};
pub use self::telemetry::{init_tracing, DEFAULT_LOG_FILTER};
