// src/module/context.rs

//! Helper API available to module implementations.
//!
//! Every helper accepts an optional [`Metadata`]; when omitted, a fresh one is
//! created with this module as source. Pass the metadata you received to keep
//! follow-up work in the same transaction.
//!
//! The plain helpers are meant for code running on the dispatch thread
//! (handlers, `run`, `run_passively`). The `_threadsafe` twins are for
//! closures started with [`ModuleContext::run_in_thread`]; they block the
//! calling thread where a result is expected.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::config::Configuration;
use crate::errors::Result;
use crate::kwargs::Kwargs;
use crate::manager::Bus;
use crate::manager::tasks::TaskId;
use crate::metadata::Metadata;
use crate::module::handlers::event_handler_name;
use crate::types::{BroadcastMode, ModuleState};

/// Per-module handle onto the bus.
#[derive(Clone)]
pub struct ModuleContext {
    name: Arc<str>,
    bus: Bus,
    state: watch::Receiver<ModuleState>,
}

impl fmt::Debug for ModuleContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleContext")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl ModuleContext {
    pub(crate) fn new(name: Arc<str>, bus: Bus, state: watch::Receiver<ModuleState>) -> Self {
        Self { name, bus, state }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn config(&self) -> &Configuration {
        self.bus.config()
    }

    pub fn state(&self) -> ModuleState {
        *self.state.borrow()
    }

    pub fn is_active(&self) -> bool {
        self.state().is_active()
    }

    pub fn is_ready(&self) -> bool {
        self.state().is_ready()
    }

    /// Resolves once the module is no longer active (deactivate/shutdown).
    pub async fn stopped_being_active(&self) {
        let mut rx = self.state.clone();
        let _ = rx.wait_for(|s| !s.is_active()).await;
    }

    /// Resolves once the module went inactive (initiate_shutdown).
    pub async fn stopped_being_ready(&self) {
        let mut rx = self.state.clone();
        let _ = rx.wait_for(|s| !s.is_ready()).await;
    }

    /// Fresh metadata with this module as source.
    pub fn metadata(&self) -> Metadata {
        Metadata::from_module(&self.name)
    }

    fn metadata_or_default(&self, metadata: Option<Metadata>) -> Metadata {
        metadata.unwrap_or_else(|| self.metadata())
    }

    fn warn_if_not_active(&self, what: &str, target: &str) {
        if !self.is_active() {
            warn!(module = %self.name, state = %self.state(), "module not active when {what} [{target}]");
        }
    }

    /// Bare method names address this module itself.
    fn qualify(&self, task: &str) -> String {
        if task.contains('.') {
            task.to_string()
        } else {
            format!("{}.{}", self.name, task)
        }
    }

    fn default_event(&self, event: Option<&str>) -> String {
        event
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}_event", self.name))
    }

    /// Call `"<module>.<method>"` and wait for its result.
    ///
    /// `Ok(None)` means the target could not be resolved (unknown or
    /// not-ready module, unknown method); that case is logged, not raised.
    pub async fn exec_task(&self, target: &str, kwargs: Kwargs, metadata: Option<Metadata>) -> Result<Option<Value>> {
        self.warn_if_not_active("executing task", target);
        let metadata = self.metadata_or_default(metadata);
        self.bus.exec_task(target, metadata, kwargs).await
    }

    /// Blocking twin of [`ModuleContext::exec_task`] for worker threads.
    pub fn exec_task_threadsafe(&self, target: &str, kwargs: Kwargs, metadata: Option<Metadata>) -> Result<Option<Value>> {
        self.warn_if_not_active("executing task", target);
        let metadata = self.metadata_or_default(metadata);
        self.bus.exec_task_threadsafe(target, metadata, kwargs)
    }

    /// Queue a task for asynchronous execution and return immediately.
    pub fn enqueue_task(&self, task: &str, kwargs: Kwargs, metadata: Option<Metadata>) {
        self.warn_if_not_active("enqueuing task", task);
        let metadata = self.metadata_or_default(metadata);
        self.bus.enqueue_task(self.qualify(task), metadata, kwargs);
    }

    pub fn enqueue_task_threadsafe(&self, task: &str, kwargs: Kwargs, metadata: Option<Metadata>) {
        self.warn_if_not_active("enqueuing task", task);
        let metadata = self.metadata_or_default(metadata);
        self.bus.enqueue_task_threadsafe(self.qualify(task), metadata, kwargs);
    }

    /// Queue event `event` (default `<module>_event`) for every other module
    /// subscribed to it.
    pub fn trigger_event(&self, event: Option<&str>, kwargs: Kwargs, metadata: Option<Metadata>) {
        let event = self.default_event(event);
        self.warn_if_not_active("triggering event", &event);
        let metadata = self.metadata_or_default(metadata);
        self.bus.trigger_event(&event, metadata, kwargs);
    }

    pub fn trigger_event_threadsafe(&self, event: Option<&str>, kwargs: Kwargs, metadata: Option<Metadata>) {
        let event = self.default_event(event);
        self.warn_if_not_active("triggering event", &event);
        let metadata = self.metadata_or_default(metadata);
        self.bus.trigger_event_threadsafe(&event, metadata, kwargs);
    }

    /// Deliver event `event` right away instead of queueing it.
    pub async fn broadcast_event(&self, event: &str, kwargs: Kwargs, metadata: Option<Metadata>, mode: BroadcastMode) {
        let metadata = self.metadata_or_default(metadata);
        self.bus
            .broadcast_event(&event_handler_name(event), metadata, kwargs, mode)
            .await;
    }

    pub fn broadcast_event_threadsafe(&self, event: &str, kwargs: Kwargs, metadata: Option<Metadata>, mode: BroadcastMode) {
        let metadata = self.metadata_or_default(metadata);
        self.bus
            .broadcast_event_threadsafe(&event_handler_name(event), metadata, kwargs, mode);
    }

    /// Run `module.method` as a tracked background task.
    pub async fn schedule_method(
        &self,
        module: &str,
        method: &str,
        kwargs: Kwargs,
        metadata: Option<Metadata>,
    ) -> Option<TaskId> {
        let metadata = self.metadata_or_default(metadata);
        self.bus.schedule_method(module, method, metadata, kwargs).await
    }

    /// Track a task spawned by this module so that failures are reported and
    /// shutdown waits for it.
    pub fn register_task(&self, handle: JoinHandle<anyhow::Result<()>>, label: &str) -> Result<TaskId> {
        self.bus.register_task(handle, format!("{}: {}", self.name, label))
    }

    /// Run blocking work on the monitored worker pool as a tracked task.
    ///
    /// The closure gets its own copy of this context and must only use the
    /// `_threadsafe` helpers. Fails only if the dispatch runtime is not
    /// running.
    pub fn run_in_thread<F>(&self, label: &str, f: F) -> Result<TaskId>
    where
        F: FnOnce(ModuleContext) -> anyhow::Result<()> + Send + 'static,
    {
        let ctx = self.clone();
        let label = format!("{}: {}", self.name, label);
        let handle = self.bus.spawn_blocking(&label, move || f(ctx))?;
        self.bus.register_task(handle, label)
    }

    /// Module setting `<module>.<item>`, or `default`.
    pub fn get_config<T: DeserializeOwned>(&self, item: &str, default: T) -> T {
        self.bus
            .config()
            .get_item(&format!("{}.{}", self.name, item), default)
    }
}
