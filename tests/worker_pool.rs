// tests/worker_pool.rs

mod common;
use crate::common::{capture_logs, init_tracing, with_timeout};

use std::sync::{Arc, Barrier};

use tokio::runtime::Handle;

use modulebus::bridge::MonitoredPool;

const MAXIMUM_REACHED: &str = "maximum number of worker threads reached";

#[tokio::test]
async fn counts_running_submissions_beyond_the_maximum() {
    init_tracing();
    let pool = MonitoredPool::new(1);
    let release = Arc::new(Barrier::new(3));

    let handles: Vec<_> = (0..2)
        .map(|i| {
            let release = Arc::clone(&release);
            pool.submit(&Handle::current(), &format!("job{i}"), move || {
                release.wait();
                i * 10
            })
        })
        .collect();

    // The second submission went past max_workers = 1; it is still counted.
    assert_eq!(pool.current(), 2);
    assert_eq!(pool.max_workers(), 1);

    let releaser = {
        let release = Arc::clone(&release);
        tokio::task::spawn_blocking(move || {
            release.wait();
        })
    };

    let mut results = Vec::new();
    for handle in handles {
        results.push(with_timeout(handle).await.unwrap());
    }
    releaser.await.unwrap();

    assert_eq!(results, vec![0, 10]);
    assert_eq!(pool.current(), 0);
}

#[tokio::test]
async fn error_is_logged_once_the_pool_is_full() {
    let pool = MonitoredPool::new(2);
    let release = Arc::new(Barrier::new(3));
    let submit = |name: &str| {
        let release = Arc::clone(&release);
        pool.submit(&Handle::current(), name, move || {
            release.wait();
        })
    };

    let (first, below) = capture_logs(|| submit("first"));
    assert_eq!(pool.current(), 1);
    assert!(!below.contains(MAXIMUM_REACHED), "logged below the maximum: {below}");

    let (second, at_max) = capture_logs(|| submit("second"));
    assert_eq!(pool.current(), 2);
    assert!(at_max.contains("ERROR"), "{at_max}");
    assert!(at_max.contains(MAXIMUM_REACHED), "{at_max}");
    assert!(at_max.contains("second"), "{at_max}");

    let releaser = {
        let release = Arc::clone(&release);
        tokio::task::spawn_blocking(move || {
            release.wait();
        })
    };
    with_timeout(first).await.unwrap();
    with_timeout(second).await.unwrap();
    releaser.await.unwrap();
    assert_eq!(pool.current(), 0);
}
