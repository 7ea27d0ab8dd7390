// src/engine/queue.rs

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tracing::trace;

use crate::kwargs::Kwargs;
use crate::metadata::Metadata;
use crate::types::Priority;

use super::QueueItem;

/// Heap entry ordered by `(priority, sequence)`, smallest first.
#[derive(Debug)]
struct Entry {
    priority: Priority,
    sequence: u64,
    item: QueueItem,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    // BinaryHeap is a max-heap; reverse so the lowest key pops first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

#[derive(Debug, Default)]
struct Inner {
    heap: BinaryHeap<Entry>,
    next_sequence: u64,
}

/// Unbounded priority queue of pending tasks and events.
///
/// Semantics:
/// - Items with a higher priority (lower ordinal) are always dequeued first,
///   including items put after lower-priority ones.
/// - Within one priority level items come out in insertion order; every put
///   draws a fresh sequence number used as the tie-break.
/// - There is no deduplication and no size limit. Callers throttle through
///   the manager's backpressure, not through the queue.
#[derive(Debug, Default)]
pub struct TaskQueue {
    inner: Mutex<Inner>,
    available: Notify,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert an item keyed by `metadata.priority()`.
    pub fn put(&self, target: impl Into<String>, metadata: Metadata, kwargs: Kwargs) {
        let item = QueueItem {
            target: target.into(),
            metadata,
            kwargs,
        };
        {
            let mut inner = self.lock();
            let sequence = inner.next_sequence;
            inner.next_sequence += 1;
            trace!(item = %item.target, sequence, "queue put");
            inner.heap.push(Entry {
                priority: item.metadata.priority(),
                sequence,
                item,
            });
        }
        self.available.notify_one();
    }

    /// Take the next item without waiting.
    pub fn try_get(&self) -> Option<QueueItem> {
        self.lock().heap.pop().map(|entry| entry.item)
    }

    /// Wait until an item is available and return it in priority order.
    pub async fn get(&self) -> QueueItem {
        loop {
            if let Some(item) = self.try_get() {
                return item;
            }
            self.available.notified().await;
        }
    }

    /// Non-blocking snapshot.
    pub fn is_empty(&self) -> bool {
        self.lock().heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock().heap.len()
    }
}
