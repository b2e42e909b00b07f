//! Unit tests for individual components

mod config_test;
mod error_test;
mod queue_test;
mod resource_pool_test;
mod runtime_test;
mod signal_test;
mod util_test;
mod worker_handle_test;
