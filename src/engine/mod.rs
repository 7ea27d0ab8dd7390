// src/engine/mod.rs

//! Queueing and dispatch core.
//!
//! - [`queue`] holds the priority queue of pending tasks and events.
//! - [`dispatch`] owns the single cooperative loop that drains it and the
//!   [`ItemProcessor`] trait the manager implements.

use std::fmt;

use crate::kwargs::Kwargs;
use crate::metadata::Metadata;

/// Canonical task target type: `"<module>.<method>"` or `"on_<event>"`.
pub type Target = String;

/// A pending unit of work.
#[derive(Debug, Clone)]
pub struct QueueItem {
    pub target: Target,
    pub metadata: Metadata,
    pub kwargs: Kwargs,
}

impl QueueItem {
    /// Targets containing a `.` address one module method; all others are
    /// broadcasts.
    pub fn is_task(&self) -> bool {
        self.target.contains('.')
    }
}

impl fmt::Display for QueueItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}) [{}]", self.target, self.kwargs, self.metadata)
    }
}

pub mod dispatch;
pub mod queue;

pub use dispatch::{DispatchLoop, ItemProcessor};
pub use queue::TaskQueue;
