// src/bridge/mod.rs

//! Cross-thread bridge into the dispatch runtime.
//!
//! - [`BridgeRequest`] is what foreign threads send over an unbounded mpsc
//!   channel when they call a bus helper.
//! - [`serve_bridge`] runs on the dispatch runtime and turns requests into
//!   the same internal calls the dispatch thread would make directly.
//! - [`pool`] is the monitored blocking pool threaded modules run on.

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::errors::Result;
use crate::kwargs::Kwargs;
use crate::manager::Bus;
use crate::metadata::Metadata;
use crate::types::BroadcastMode;

pub mod pool;

pub use pool::MonitoredPool;

/// Reply channel of a call waiting for its result.
pub type ExecReply = oneshot::Sender<Result<Option<Value>>>;

/// A helper call marshalled from a non-dispatch thread.
#[derive(Debug)]
pub enum BridgeRequest {
    /// Resolve and await `target`, then send the result back.
    Exec {
        target: String,
        metadata: Metadata,
        kwargs: Kwargs,
        reply: ExecReply,
    },
    /// Put an item on the task queue.
    Enqueue {
        target: String,
        metadata: Metadata,
        kwargs: Kwargs,
    },
    /// Deliver handler `handler` to every subscribed module right away.
    Broadcast {
        handler: String,
        metadata: Metadata,
        kwargs: Kwargs,
        mode: BroadcastMode,
    },
}

impl BridgeRequest {
    pub(crate) fn describe(&self) -> &str {
        match self {
            BridgeRequest::Exec { target, .. } | BridgeRequest::Enqueue { target, .. } => target,
            BridgeRequest::Broadcast { handler, .. } => handler,
        }
    }
}

/// Receive bridge requests until every sender is gone.
///
/// Calls are spawned rather than awaited, so a slow handler never holds up
/// the requests behind it.
pub async fn serve_bridge(bus: Bus, mut rx: mpsc::UnboundedReceiver<BridgeRequest>) {
    debug!("bridge started");

    while let Some(request) = rx.recv().await {
        debug!(request = %request.describe(), "bridge request");
        match request {
            BridgeRequest::Exec {
                target,
                metadata,
                kwargs,
                reply,
            } => {
                let bus = bus.clone();
                tokio::spawn(async move {
                    let result = bus.exec_task_internal(&target, metadata, kwargs).await;
                    if reply.send(result).is_err() {
                        warn!(task = %target, "caller stopped waiting for result");
                    }
                });
            }
            BridgeRequest::Enqueue {
                target,
                metadata,
                kwargs,
            } => bus.queue().put(target, metadata, kwargs),
            BridgeRequest::Broadcast {
                handler,
                metadata,
                kwargs,
                mode,
            } => {
                let bus = bus.clone();
                tokio::spawn(async move {
                    bus.broadcast_internal(&handler, metadata, kwargs, mode).await;
                });
            }
        }
    }

    debug!("bridge stopped");
}
