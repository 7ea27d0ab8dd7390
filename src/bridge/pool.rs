// src/bridge/pool.rs

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Blocking worker pool that keeps count of executing submissions.
///
/// Work runs on the runtime's blocking pool, whose size the manager sets to
/// `max_workers`. The submission that brings the count to the maximum is
/// reported at error level, as is every one after it; those still run once
/// a thread is free.
#[derive(Debug)]
pub struct MonitoredPool {
    max_workers: usize,
    current: Arc<AtomicUsize>,
}

struct Running(Arc<AtomicUsize>);

impl Drop for Running {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MonitoredPool {
    pub fn new(max_workers: usize) -> Self {
        Self {
            max_workers,
            current: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Submissions currently executing or waiting for a thread.
    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    /// Run `f` on a blocking thread of `runtime`.
    pub fn submit<F, R>(&self, runtime: &Handle, label: &str, f: F) -> JoinHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let current = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        if self.max_workers > 0 && current >= self.max_workers {
            error!(
                task = %label,
                current,
                max_workers = self.max_workers,
                "maximum number of worker threads reached"
            );
        } else {
            debug!(task = %label, current, "submitted to worker pool");
        }

        let guard = Running(Arc::clone(&self.current));
        runtime.spawn_blocking(move || {
            let _guard = guard;
            f()
        })
    }
}
