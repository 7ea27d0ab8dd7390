// src/manager/mod.rs

//! Module manager: registry, router and lifecycle driver.
//!
//! This layer wires together:
//! - the module registry built once from name → factory pairs
//! - the [`Bus`] handle every module and embedding application talks to
//! - the dispatch loop, with the manager as its [`ItemProcessor`]
//! - the cross-thread bridge and OS signal handling

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use regex::Regex;
use tracing::{debug, error, info, warn};

use crate::bridge::serve_bridge;
use crate::config::Configuration;
use crate::engine::{DispatchLoop, ItemProcessor, QueueItem};
use crate::errors::{ModuleBusError, Result};
use crate::metadata::Metadata;
use crate::module::{Lifecycle, ModuleContext, ModuleFactory, ModuleSlot};
use crate::types::BroadcastMode;

pub mod backpressure;
pub mod bus;
pub mod tasks;

pub use backpressure::Backpressure;
pub use bus::{BECOMING_IDLE_EVENT, Bus, EXIT_EVENT};
pub use tasks::{FinishedTask, TaskId, TaskOutcome, TaskTracker};

/// Module names: non-empty, no `.` (it separates module and method), no
/// whitespace.
const MODULE_NAME_PATTERN: &str = r"^[^.\s]+$";

/// Owns the registry and drives the dispatch loop.
#[derive(Debug)]
pub struct ModuleManager {
    bus: Bus,
}

impl ModuleManager {
    /// Construct every module in the given order.
    ///
    /// Registration order is also the order of every broadcast.
    pub fn new(config: Configuration, modules: Vec<(String, ModuleFactory)>) -> Result<Self> {
        let name_pattern = Regex::new(MODULE_NAME_PATTERN).map_err(|e| ModuleBusError::Other(e.into()))?;
        let bus = Bus::new(config);
        let mut registry = IndexMap::with_capacity(modules.len());

        for (name, factory) in modules {
            if !name_pattern.is_match(&name) {
                return Err(ModuleBusError::InvalidModuleName(name));
            }
            if registry.contains_key(&name) {
                return Err(ModuleBusError::DuplicateModule(name));
            }

            let name: Arc<str> = Arc::from(name.as_str());
            let state = ModuleSlot::state_channel();
            let ctx = ModuleContext::new(Arc::clone(&name), bus.clone(), state.subscribe());
            let module = factory(&ctx);
            let slot = ModuleSlot::new(Arc::clone(&name), module, state);
            registry.insert(name.to_string(), Arc::new(slot));
        }

        info!(modules = ?registry.keys().collect::<Vec<_>>(), "modules registered");
        bus.install_registry(registry);
        Ok(Self { bus })
    }

    /// Handle for triggering events or requesting shutdown from outside.
    pub fn handle(&self) -> Bus {
        self.bus.clone()
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Start all modules, then dispatch until shutdown completed.
    ///
    /// Must run on a current-thread runtime: that thread becomes the dispatch
    /// thread. A manager can be served once.
    pub async fn serve(&self) -> Result<()> {
        let bus = &self.bus;
        bus.attach_dispatch_thread()?;
        let bridge_rx = bus
            .take_bridge_receiver()
            .ok_or_else(|| ModuleBusError::Bridge("bridge receiver already taken".to_string()))?;
        let bridge = tokio::spawn(serve_bridge(bus.clone(), bridge_rx));

        let metadata = Metadata::from_manager();
        bus.run_lifecycle(Lifecycle::Startup, &metadata).await;
        tokio::task::yield_now().await;
        bus.run_lifecycle(Lifecycle::Activate, &metadata).await;
        tokio::task::yield_now().await;

        let mut dispatch = DispatchLoop::new(Arc::clone(bus.queue()));
        let mut processor = ManagerProcessor { bus: bus.clone() };

        tokio::select! {
            _ = dispatch.run(&mut processor) => {}
            _ = bus.hard_stopped() => {
                warn!(in_flight = bus.tasks().in_flight(), "dispatch loop stopped without waiting for tasks");
                bus.tasks().abort_all();
            }
        }

        bus.tasks().reap();
        bridge.abort();
        info!("module manager stopped");
        Ok(())
    }

    /// Blocking entry point for binaries: build the dispatch runtime, listen
    /// for signals and serve until shutdown.
    pub fn run(self) -> Result<()> {
        let max_workers = self.bus.config().bus().max_workers.max(1);
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .max_blocking_threads(max_workers)
            .thread_name("modulebus-worker")
            .build()?;

        let result = runtime.block_on(async {
            tokio::spawn(listen_for_signals(self.bus.clone()));
            self.serve().await
        });

        runtime.shutdown_timeout(Duration::from_secs(1));
        result
    }
}

/// Routes dequeued items: tasks become background tasks, everything else is
/// a concurrent broadcast.
struct ManagerProcessor {
    bus: Bus,
}

impl ItemProcessor for ManagerProcessor {
    fn process_item(&mut self, item: QueueItem) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            let QueueItem {
                target,
                metadata,
                kwargs,
            } = item;

            match target.split_once('.') {
                Some((module, method)) => {
                    self.bus.schedule_method(module, method, metadata, kwargs).await;
                }
                None => {
                    self.bus
                        .broadcast_internal(&target, metadata, kwargs, BroadcastMode::Concurrent)
                        .await;
                }
            }
        })
    }

    fn queue_empty(&mut self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        Box::pin(async move {
            let stop = self.bus.on_idle().await;
            debug!(stop, "queue drained");
            stop
        })
    }
}

/// First SIGINT/SIGTERM requests a graceful shutdown, the second one aborts
/// every outstanding task.
async fn listen_for_signals(bus: Bus) {
    let mut received = 0usize;
    loop {
        if let Err(e) = wait_for_signal().await {
            error!(error = %e, "failed to listen for shutdown signals");
            return;
        }
        received += 1;
        if received == 1 {
            info!("signal received; shutting down (send again to abort)");
            bus.shutdown();
        } else {
            warn!("second signal received; aborting outstanding tasks");
            bus.abort();
            return;
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = interrupt.recv() => {}
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
