// src/engine/dispatch.rs

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, info};

use super::QueueItem;
use super::queue::TaskQueue;

/// Callbacks driven by the [`DispatchLoop`].
///
/// Production code uses the module manager; tests can provide their own
/// implementation that records what was processed.
pub trait ItemProcessor: Send {
    /// Handle a single dequeued item.
    ///
    /// The loop awaits this before taking the next item, so long-running work
    /// should be scheduled in the background rather than awaited here.
    fn process_item(&mut self, item: QueueItem) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;

    /// Called whenever processing an item left the queue empty.
    ///
    /// Returning `true` means "no more work, ever" and stops the loop.
    fn queue_empty(&mut self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>>;
}

/// Single cooperative loop pulling items off the shared [`TaskQueue`].
///
/// Per cycle:
/// 1. wait for and dequeue one item
/// 2. hand it to the processor
/// 3. yield once so that other tasks may refill the queue
/// 4. if the queue is now empty, ask the processor whether to stop
///
/// The loop never processes two items at the same time; concurrency comes
/// from the processor scheduling background tasks.
pub struct DispatchLoop {
    queue: Arc<TaskQueue>,
    running: bool,
    processed: u64,
}

impl fmt::Debug for DispatchLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchLoop")
            .field("pending", &self.queue.len())
            .field("running", &self.running)
            .field("processed", &self.processed)
            .finish()
    }
}

impl DispatchLoop {
    pub fn new(queue: Arc<TaskQueue>) -> Self {
        Self {
            queue,
            running: false,
            processed: 0,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Number of items processed so far.
    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Gets and processes a single item. Returns `false` once the processor
    /// asked the loop to stop.
    pub async fn process_next<P: ItemProcessor + ?Sized>(&mut self, processor: &mut P) -> bool {
        let item = self.queue.get().await;
        debug!(item = %item.target, transaction = %item.metadata.transaction_id(), "got item from queue");

        processor.process_item(item).await;
        self.processed += 1;

        tokio::task::yield_now().await;

        if self.queue.is_empty() && processor.queue_empty().await {
            return false;
        }
        true
    }

    /// Run until the processor reports that there is no more work.
    pub async fn run<P: ItemProcessor + ?Sized>(&mut self, processor: &mut P) {
        self.running = true;
        info!("dispatch loop started");

        while self.running {
            if !self.process_next(processor).await {
                self.running = false;
            }
        }

        info!(processed = self.processed, "dispatch loop stopped");
    }
}
