//! Tests for configuration validation

use nova_pool::config::{MaxQueue, PoolConfig, QueueKind};
use nova_pool::core::PoolError;
use std::time::Duration;

#[test]
fn test_default_config_is_valid() {
    let config = PoolConfig::default();
    assert!(config.validate().is_ok());
    assert!(config.max_threads >= 1);
    assert!(config.min_threads <= config.max_threads);
    assert_eq!(config.concurrent_tasks_per_worker, 1);
    assert_eq!(config.queue, QueueKind::Fifo);
    assert_eq!(config.queue_limit(), None);
}

#[test]
fn test_invalid_thread_counts() {
    let zero = PoolConfig::new().with_threads(0, 0);
    assert!(matches!(zero.validate(), Err(PoolError::InvalidConfig(_))));

    let inverted = PoolConfig::new().with_threads(4, 2);
    assert!(matches!(inverted.validate(), Err(PoolError::InvalidConfig(_))));
}

#[test]
fn test_invalid_ceiling() {
    let config = PoolConfig::new().with_concurrent_tasks_per_worker(0);
    assert!(matches!(config.validate(), Err(PoolError::InvalidConfig(_))));
}

#[test]
fn test_empty_filename_rejected() {
    let config = PoolConfig::new().with_filename("");
    assert_eq!(config.validate(), Err(PoolError::FileNameNotProvided));
}

#[test]
fn test_queue_limit_resolution() {
    let auto = PoolConfig::new()
        .with_threads(1, 3)
        .with_max_queue(MaxQueue::Auto);
    assert_eq!(auto.queue_limit(), Some(9));

    let fixed = PoolConfig::new().with_max_queue(MaxQueue::Limit(5));
    assert_eq!(fixed.queue_limit(), Some(5));
}

#[test]
fn test_timeouts() {
    let config = PoolConfig::new();
    assert_eq!(config.idle_timeout(), None);
    assert_eq!(config.terminate_timeout(), None);

    let config = config
        .with_idle_timeout_ms(250)
        .with_terminate_timeout_ms(1_000);
    assert_eq!(config.idle_timeout(), Some(Duration::from_millis(250)));
    assert_eq!(config.terminate_timeout(), Some(Duration::from_secs(1)));
}

#[test]
fn test_from_json_str() {
    let config = PoolConfig::from_json_str(
        r#"{
            "filename": "worker.js",
            "min_threads": 1,
            "max_threads": 2,
            "max_queue": {"limit": 8},
            "concurrent_tasks_per_worker": 2,
            "queue": "priority"
        }"#,
    )
    .unwrap();
    assert_eq!(config.filename.as_deref(), Some("worker.js"));
    assert_eq!(config.max_threads, 2);
    assert_eq!(config.queue_limit(), Some(8));
    assert_eq!(config.queue, QueueKind::Priority);
    assert_eq!(config.idle_timeout_ms, 0);
}

#[test]
fn test_from_json_str_rejects_invalid() {
    assert!(matches!(
        PoolConfig::from_json_str("not json"),
        Err(PoolError::InvalidConfig(_))
    ));
    assert!(matches!(
        PoolConfig::from_json_str(r#"{"max_threads": 0, "min_threads": 0}"#),
        Err(PoolError::InvalidConfig(_))
    ));
}

#[test]
fn test_from_env_overrides() {
    std::env::set_var("NOVA_POOL_FILENAME", "env-worker.js");
    std::env::set_var("NOVA_POOL_MIN_THREADS", "1");
    std::env::set_var("NOVA_POOL_MAX_THREADS", "3");
    std::env::set_var("NOVA_POOL_MAX_QUEUE", "auto");
    std::env::set_var("NOVA_POOL_TERMINATE_TIMEOUT_MS", "500");

    let config = PoolConfig::from_env().unwrap();
    assert_eq!(config.filename.as_deref(), Some("env-worker.js"));
    assert_eq!(config.max_threads, 3);
    assert_eq!(config.queue_limit(), Some(9));
    assert_eq!(config.terminate_timeout_ms, Some(500));

    std::env::set_var("NOVA_POOL_MAX_THREADS", "many");
    assert!(matches!(PoolConfig::from_env(), Err(PoolError::InvalidConfig(_))));

    for key in [
        "NOVA_POOL_FILENAME",
        "NOVA_POOL_MIN_THREADS",
        "NOVA_POOL_MAX_THREADS",
        "NOVA_POOL_MAX_QUEUE",
        "NOVA_POOL_TERMINATE_TIMEOUT_MS",
    ] {
        std::env::remove_var(key);
    }
}
