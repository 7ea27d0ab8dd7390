// src/manager/bus.rs

//! Shared handle onto the manager's state.
//!
//! The `Bus` routes everything: task resolution, queueing, broadcasts,
//! background-task tracking and the hop from foreign threads into the
//! dispatch runtime. Each public helper checks whether it runs on the
//! dispatch thread; if not, the call is sent over the bridge.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::thread::{self, ThreadId};

use indexmap::IndexMap;
use serde_json::Value;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::{Notify, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::bridge::{BridgeRequest, MonitoredPool};
use crate::config::Configuration;
use crate::engine::TaskQueue;
use crate::errors::{ModuleBusError, Result};
use crate::kwargs::Kwargs;
use crate::metadata::Metadata;
use crate::module::{Lifecycle, ModuleSlot, event_handler_name};
use crate::types::{BroadcastMode, ModuleState};

use super::backpressure::Backpressure;
use super::tasks::{TaskId, TaskOutcome, TaskTracker};

/// Event whose broadcast starts the shutdown sequence.
pub const EXIT_EVENT: &str = "exit";

/// Advisory event broadcast whenever the queue runs dry.
pub const BECOMING_IDLE_EVENT: &str = "becoming_idle";

pub(crate) type Registry = IndexMap<String, Arc<ModuleSlot>>;

struct BusInner {
    config: Configuration,
    queue: Arc<TaskQueue>,
    registry: OnceLock<Registry>,
    tasks: TaskTracker,
    pool: MonitoredPool,
    bridge_tx: mpsc::UnboundedSender<BridgeRequest>,
    bridge_rx: Mutex<Option<mpsc::UnboundedReceiver<BridgeRequest>>>,
    dispatch_thread: OnceLock<ThreadId>,
    runtime: OnceLock<Handle>,
    exiting: AtomicBool,
    hard_stop: Notify,
}

/// Cloneable handle onto the manager. Modules reach it through their
/// [`crate::module::ModuleContext`]; embedding code through
/// [`crate::manager::ModuleManager::handle`].
#[derive(Clone)]
pub struct Bus {
    inner: Arc<BusInner>,
}

impl fmt::Debug for Bus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bus")
            .field("modules", &self.module_names())
            .field("pending", &self.inner.queue.len())
            .field("tasks", &self.inner.tasks)
            .field("exiting", &self.is_exiting())
            .finish()
    }
}

impl Bus {
    pub(crate) fn new(config: Configuration) -> Self {
        let (bridge_tx, bridge_rx) = mpsc::unbounded_channel();
        let exception_log = config.bus().exception_log.clone();
        let max_workers = config.bus().max_workers;
        Self {
            inner: Arc::new(BusInner {
                config,
                queue: Arc::new(TaskQueue::new()),
                registry: OnceLock::new(),
                tasks: TaskTracker::new(exception_log),
                pool: MonitoredPool::new(max_workers),
                bridge_tx,
                bridge_rx: Mutex::new(Some(bridge_rx)),
                dispatch_thread: OnceLock::new(),
                runtime: OnceLock::new(),
                exiting: AtomicBool::new(false),
                hard_stop: Notify::new(),
            }),
        }
    }

    pub(crate) fn install_registry(&self, registry: Registry) {
        if self.inner.registry.set(registry).is_err() {
            warn!("module registry installed twice; keeping the first one");
        }
    }

    /// Record the current thread and runtime as the dispatch thread.
    ///
    /// Only a current-thread runtime qualifies: every handler must be polled
    /// on the thread recorded here.
    pub(crate) fn attach_dispatch_thread(&self) -> Result<()> {
        let runtime = Handle::current();
        let flavor = runtime.runtime_flavor();
        if flavor != RuntimeFlavor::CurrentThread {
            return Err(ModuleBusError::Bridge(format!(
                "manager must be served on a current-thread runtime, not {flavor:?}"
            )));
        }
        let id = thread::current().id();
        if self.inner.dispatch_thread.set(id).is_err() {
            return Err(ModuleBusError::Bridge("manager is already being served".to_string()));
        }
        let _ = self.inner.runtime.set(runtime);
        Ok(())
    }

    pub(crate) fn take_bridge_receiver(&self) -> Option<mpsc::UnboundedReceiver<BridgeRequest>> {
        self.inner
            .bridge_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub fn config(&self) -> &Configuration {
        &self.inner.config
    }

    pub fn queue(&self) -> &Arc<TaskQueue> {
        &self.inner.queue
    }

    pub fn tasks(&self) -> &TaskTracker {
        &self.inner.tasks
    }

    pub fn pool(&self) -> &MonitoredPool {
        &self.inner.pool
    }

    fn modules(&self) -> impl Iterator<Item = &Arc<ModuleSlot>> {
        self.inner.registry.get().into_iter().flat_map(|r| r.values())
    }

    pub fn module(&self, name: &str) -> Option<&Arc<ModuleSlot>> {
        self.inner.registry.get()?.get(name)
    }

    /// Registered module names in registration order.
    pub fn module_names(&self) -> Vec<String> {
        self.modules().map(|slot| slot.name().to_string()).collect()
    }

    pub fn module_count(&self) -> usize {
        self.inner.registry.get().map_or(0, IndexMap::len)
    }

    pub fn module_state(&self, name: &str) -> Option<ModuleState> {
        self.module(name).map(|slot| slot.state())
    }

    /// Whether `name` is registered and passive or active.
    pub fn is_ready_module(&self, name: &str) -> bool {
        self.module(name).is_some_and(|slot| slot.is_ready())
    }

    pub fn running_task_labels(&self) -> Vec<String> {
        self.inner.tasks.running_labels()
    }

    pub fn is_exiting(&self) -> bool {
        self.inner.exiting.load(Ordering::SeqCst)
    }

    pub fn is_dispatch_thread(&self) -> bool {
        self.inner.dispatch_thread.get() == Some(&thread::current().id())
    }

    fn runtime(&self) -> Result<Handle> {
        if let Some(handle) = self.inner.runtime.get() {
            return Ok(handle.clone());
        }
        Handle::try_current().map_err(|_| ModuleBusError::Bridge("dispatch runtime is not running".to_string()))
    }

    fn send(&self, request: BridgeRequest) -> Result<()> {
        self.inner
            .bridge_tx
            .send(request)
            .map_err(|e| ModuleBusError::Bridge(format!("dispatch loop gone, dropped [{}]", e.0.describe())))
    }

    // ------------------------------------------------------------------
    // Public helpers, usable from any thread
    // ------------------------------------------------------------------

    /// Resolve `target` and await its handler.
    ///
    /// Off the dispatch thread the call is marshalled over the bridge and
    /// only the current task waits for the reply.
    pub async fn exec_task(&self, target: &str, metadata: Metadata, kwargs: Kwargs) -> Result<Option<Value>> {
        if self.is_dispatch_thread() {
            return self.exec_task_internal(target, metadata, kwargs).await;
        }

        let (reply, rx) = oneshot::channel();
        self.send(BridgeRequest::Exec {
            target: target.to_string(),
            metadata,
            kwargs,
            reply,
        })?;
        rx.await
            .map_err(|_| ModuleBusError::Bridge(format!("no reply for [{target}]")))?
    }

    /// Blocking twin of [`Bus::exec_task`].
    ///
    /// Must be called from a plain or blocking-pool thread. On the dispatch
    /// thread it fails with [`ModuleBusError::WrongThread`].
    pub fn exec_task_threadsafe(&self, target: &str, metadata: Metadata, kwargs: Kwargs) -> Result<Option<Value>> {
        if self.is_dispatch_thread() {
            error!(task = %target, "exec_task_threadsafe called on the dispatch thread; use exec_task");
            return Err(ModuleBusError::WrongThread(target.to_string()));
        }

        let (reply, rx) = oneshot::channel();
        self.send(BridgeRequest::Exec {
            target: target.to_string(),
            metadata,
            kwargs,
            reply,
        })?;
        rx.blocking_recv()
            .map_err(|_| ModuleBusError::Bridge(format!("no reply for [{target}]")))?
    }

    /// Put `target` on the queue.
    pub fn enqueue_task(&self, target: String, metadata: Metadata, kwargs: Kwargs) {
        if self.is_dispatch_thread() {
            self.inner.queue.put(target, metadata, kwargs);
        } else {
            self.enqueue_task_threadsafe(target, metadata, kwargs);
        }
    }

    pub fn enqueue_task_threadsafe(&self, target: String, metadata: Metadata, kwargs: Kwargs) {
        if let Err(e) = self.send(BridgeRequest::Enqueue {
            target,
            metadata,
            kwargs,
        }) {
            error!(error = %e, "could not enqueue task");
        }
    }

    /// Queue event `event` for all subscribers but the metadata's source.
    pub fn trigger_event(&self, event: &str, metadata: Metadata, kwargs: Kwargs) {
        self.enqueue_task(event_handler_name(event), metadata, kwargs);
    }

    pub fn trigger_event_threadsafe(&self, event: &str, metadata: Metadata, kwargs: Kwargs) {
        self.enqueue_task_threadsafe(event_handler_name(event), metadata, kwargs);
    }

    /// Deliver `handler` (e.g. `on_tick`) to every subscriber now, bypassing
    /// the queue.
    pub async fn broadcast_event(&self, handler: &str, metadata: Metadata, kwargs: Kwargs, mode: BroadcastMode) {
        if self.is_dispatch_thread() {
            self.broadcast_internal(handler, metadata, kwargs, mode).await;
        } else {
            self.broadcast_event_threadsafe(handler, metadata, kwargs, mode);
        }
    }

    pub fn broadcast_event_threadsafe(&self, handler: &str, metadata: Metadata, kwargs: Kwargs, mode: BroadcastMode) {
        if let Err(e) = self.send(BridgeRequest::Broadcast {
            handler: handler.to_string(),
            metadata,
            kwargs,
            mode,
        }) {
            error!(error = %e, "could not broadcast event");
        }
    }

    /// Trigger the `exit` event: modules get `on_exit`, then the shutdown
    /// lifecycle runs and the dispatch loop stops once nothing is in flight.
    pub fn shutdown(&self) {
        info!("shutdown requested");
        self.trigger_event(EXIT_EVENT, Metadata::from_manager(), Kwargs::new());
    }

    /// Cancel every tracked task and stop the dispatch loop without waiting.
    pub fn abort(&self) {
        warn!("hard stop requested");
        self.inner.tasks.abort_all();
        self.inner.hard_stop.notify_one();
    }

    pub(crate) async fn hard_stopped(&self) {
        self.inner.hard_stop.notified().await;
    }

    // ------------------------------------------------------------------
    // Background tasks
    // ------------------------------------------------------------------

    /// Spawn `fut` on the dispatch runtime as a tracked task, waiting for a
    /// free slot first (see [`Backpressure`]).
    pub async fn schedule<F>(&self, label: String, fut: F) -> TaskId
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let backpressure = Backpressure::from_config(self.config().bus(), self.module_count());
        backpressure.wait(&label, || self.inner.tasks.in_flight()).await;

        let handle = tokio::spawn(fut);
        self.track(handle, label, Handle::current())
    }

    /// Track a task spawned elsewhere.
    pub fn register_task(&self, handle: JoinHandle<anyhow::Result<()>>, label: String) -> Result<TaskId> {
        let runtime = self.runtime()?;
        Ok(self.track(handle, label, runtime))
    }

    fn track(&self, handle: JoinHandle<anyhow::Result<()>>, label: String, runtime: Handle) -> TaskId {
        let id = self.inner.tasks.insert(label, handle.abort_handle());
        let bus = self.clone();
        runtime.spawn(async move {
            let outcome = TaskOutcome::from_join(handle.await);
            bus.inner.tasks.complete(id, outcome);
        });
        id
    }

    /// Run blocking work on the monitored pool.
    pub fn spawn_blocking<F, R>(&self, label: &str, f: F) -> Result<JoinHandle<R>>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let runtime = self.runtime()?;
        Ok(self.inner.pool.submit(&runtime, label, f))
    }

    pub async fn wait_for_task(&self, id: TaskId) {
        self.inner.tasks.wait_for(id).await;
    }

    // ------------------------------------------------------------------
    // Dispatch-thread internals
    // ------------------------------------------------------------------

    /// Look up the slot and method of `module.method`, logging why not.
    fn resolve(&self, module: &str, method: &str, metadata: &Metadata) -> Option<Arc<ModuleSlot>> {
        let Some(slot) = self.module(module) else {
            error!(module = %module, method = %method, transaction = %metadata.transaction_id(), "unknown module");
            return None;
        };
        if !slot.is_ready() {
            error!(
                module = %module,
                method = %method,
                state = %slot.state(),
                transaction = %metadata.transaction_id(),
                "module not ready"
            );
            return None;
        }
        if !slot.handlers().contains(method) {
            error!(module = %module, method = %method, transaction = %metadata.transaction_id(), "unknown method");
            return None;
        }
        Some(Arc::clone(slot))
    }

    /// Resolve `module.method` and await its handler on the current task.
    pub(crate) async fn exec_task_internal(&self, target: &str, metadata: Metadata, kwargs: Kwargs) -> Result<Option<Value>> {
        let Some((module, method)) = target.split_once('.') else {
            error!(task = %target, "task target must have the form <module>.<method>");
            return Ok(None);
        };
        let Some(slot) = self.resolve(module, method, &metadata) else {
            return Ok(None);
        };
        let Some(call) = slot.call(self, method, metadata, kwargs) else {
            return Ok(None);
        };

        debug!(task = %target, "executing task");
        call.await
            .map(Some)
            .map_err(|source| ModuleBusError::Handler {
                target: target.to_string(),
                source,
            })
    }

    /// Resolve `module.method` and start it as a tracked background task.
    pub async fn schedule_method(&self, module: &str, method: &str, metadata: Metadata, kwargs: Kwargs) -> Option<TaskId> {
        let slot = self.resolve(module, method, &metadata)?;
        let call = slot.call(self, method, metadata, kwargs)?;
        let id = self
            .schedule(format!("{module}.{method}"), async move { call.await.map(drop) })
            .await;
        Some(id)
    }

    /// Deliver `handler` to every module that has it, except the source.
    ///
    /// `on_exit` is always delivered sequentially and followed by the
    /// shutdown lifecycle.
    pub(crate) async fn broadcast_internal(&self, handler: &str, metadata: Metadata, kwargs: Kwargs, mode: BroadcastMode) {
        let is_exit = handler == event_handler_name(EXIT_EVENT);
        let mode = if is_exit { BroadcastMode::Sequential } else { mode };
        let slots: Vec<Arc<ModuleSlot>> = self.modules().cloned().collect();

        for slot in slots {
            if metadata.is_from(slot.name()) {
                continue;
            }
            let Some(call) = slot.call(self, handler, metadata.clone(), kwargs.clone()) else {
                continue;
            };
            let label = format!("{}.{}", slot.name(), handler);
            match mode {
                BroadcastMode::Concurrent => {
                    self.schedule(label, async move { call.await.map(drop) }).await;
                }
                BroadcastMode::Sequential => {
                    if let Err(e) = call.await {
                        error!(event = %label, transaction = %metadata.transaction_id(), error = %format!("{e:#}"), "event handler failed");
                    }
                }
            }
        }

        if is_exit {
            self.begin_shutdown().await;
        }
    }

    /// Run one lifecycle step on every module, in registration order.
    pub(crate) async fn run_lifecycle(&self, step: Lifecycle, metadata: &Metadata) {
        info!(step = %step, transaction = %metadata.transaction_id(), "lifecycle broadcast");
        let slots: Vec<Arc<ModuleSlot>> = self.modules().cloned().collect();
        for slot in slots {
            slot.run_lifecycle(self, step, metadata).await;
        }
    }

    async fn begin_shutdown(&self) {
        if self.inner.exiting.swap(true, Ordering::SeqCst) {
            debug!("already exiting");
            return;
        }
        info!("shutting down modules");
        let metadata = Metadata::from_manager();
        for step in [Lifecycle::Deactivate, Lifecycle::InitiateShutdown, Lifecycle::FinalizeShutdown] {
            self.run_lifecycle(step, &metadata).await;
        }
    }

    /// Idle reaction: report finished tasks, announce idleness and, when
    /// exiting, wait for the rest. Returns `true` if the loop may stop.
    pub(crate) async fn on_idle(&self) -> bool {
        self.inner.tasks.reap();
        self.broadcast_internal(
            &event_handler_name(BECOMING_IDLE_EVENT),
            Metadata::from_manager(),
            Kwargs::new(),
            BroadcastMode::Concurrent,
        )
        .await;

        if !self.is_exiting() {
            return false;
        }

        self.inner.tasks.wait_all().await;
        self.inner.tasks.reap();
        self.inner.tasks.in_flight() == 0 && self.inner.queue.is_empty()
    }
}
