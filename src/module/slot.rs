// src/module/slot.rs

//! Manager-side lifecycle state machine of one registered module.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::{debug, error, warn};

use crate::kwargs::Kwargs;
use crate::manager::Bus;
use crate::manager::tasks::TaskId;
use crate::metadata::Metadata;
use crate::module::context::ModuleContext;
use crate::module::handlers::{BoxFuture, HandlerResult, HandlerTable};
use crate::module::{AppModule, Lifecycle};
use crate::types::ModuleState;

/// A registered module plus the bookkeeping the manager keeps for it.
///
/// Transitions:
///
/// ```text
/// inactive --startup--> passive --activate--> active
///    ^                     |  ^                  |
///    +--initiate_shutdown--+  +----deactivate----+
/// ```
pub struct ModuleSlot {
    name: Arc<str>,
    module: Arc<dyn AppModule>,
    handlers: HandlerTable,
    state: watch::Sender<ModuleState>,
    active_task: Mutex<Option<TaskId>>,
    passive_task: Mutex<Option<TaskId>>,
}

impl fmt::Debug for ModuleSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleSlot")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("handlers", &self.handlers)
            .finish_non_exhaustive()
    }
}

fn lock(slot: &Mutex<Option<TaskId>>) -> MutexGuard<'_, Option<TaskId>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ModuleSlot {
    /// State channel for a module that is about to be constructed.
    pub(crate) fn state_channel() -> watch::Sender<ModuleState> {
        watch::Sender::new(ModuleState::Inactive)
    }

    pub(crate) fn new(name: Arc<str>, module: Arc<dyn AppModule>, state: watch::Sender<ModuleState>) -> Self {
        let handlers = Arc::clone(&module).handlers();
        debug!(module = %name, handlers = ?handlers, "module registered");
        Self {
            name,
            module,
            handlers,
            state,
            active_task: Mutex::new(None),
            passive_task: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ModuleState {
        *self.state.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.state().is_ready()
    }

    pub fn handlers(&self) -> &HandlerTable {
        &self.handlers
    }

    pub fn active_task(&self) -> Option<TaskId> {
        *lock(&self.active_task)
    }

    pub fn passive_task(&self) -> Option<TaskId> {
        *lock(&self.passive_task)
    }

    fn set_state(&self, new_state: ModuleState) {
        self.state.send_replace(new_state);
        debug!(module = %self.name, state = %new_state, "new module state");
    }

    /// Helper API handle bound to this module.
    pub fn context(&self, bus: &Bus) -> ModuleContext {
        ModuleContext::new(Arc::clone(&self.name), bus.clone(), self.state.subscribe())
    }

    /// Prepare a call of handler `name`, or `None` if the module has no such
    /// method or event handler.
    pub fn call(
        &self,
        bus: &Bus,
        name: &str,
        metadata: Metadata,
        kwargs: Kwargs,
    ) -> Option<BoxFuture<'static, HandlerResult>> {
        let handler = self.handlers.get(name)?;
        Some(handler(self.context(bus), metadata, kwargs))
    }

    /// Run one lifecycle step and tell the module if it took effect.
    pub async fn run_lifecycle(&self, bus: &Bus, step: Lifecycle, metadata: &Metadata) {
        let applied = match step {
            Lifecycle::Startup => self.startup(bus, metadata).await,
            Lifecycle::Activate => self.activate(bus, metadata).await,
            Lifecycle::Deactivate => self.deactivate(),
            Lifecycle::InitiateShutdown => self.initiate_shutdown(),
            Lifecycle::FinalizeShutdown => self.finalize_shutdown(bus).await,
        };
        if applied {
            self.module.on_lifecycle(&self.context(bus), step);
        }
    }

    /// Initialize, go passive and start `run_passively` in the background.
    async fn startup(&self, bus: &Bus, metadata: &Metadata) -> bool {
        if self.state() != ModuleState::Inactive {
            warn!(module = %self.name, state = %self.state(), "startup of a module that is not inactive; ignoring");
            return false;
        }

        let ctx = self.context(bus);
        if let Err(e) = self.module.initialize(&ctx).await {
            error!(
                module = %self.name,
                transaction = %metadata.transaction_id(),
                error = %format!("{e:#}"),
                "module initialization failed; module stays inactive"
            );
            return false;
        }

        self.set_state(ModuleState::Passive);
        debug!(module = %self.name, "run module (passively)");

        let module = Arc::clone(&self.module);
        let run_metadata = Metadata::from_module(&self.name);
        let label = format!("{}.run_passively", self.name);
        let id = bus
            .schedule(label, async move { module.run_passively(ctx, run_metadata).await })
            .await;
        *lock(&self.passive_task) = Some(id);
        true
    }

    /// Go active and start `run` in the background; refused unless passive.
    async fn activate(&self, bus: &Bus, metadata: &Metadata) -> bool {
        if self.state() != ModuleState::Passive {
            warn!(
                module = %self.name,
                state = %self.state(),
                transaction = %metadata.transaction_id(),
                "attempted to activate module that was not in passive state before"
            );
            return false;
        }

        self.set_state(ModuleState::Active);
        debug!(module = %self.name, "run module");

        let module = Arc::clone(&self.module);
        let ctx = self.context(bus);
        let run_metadata = Metadata::from_module(&self.name);
        let label = format!("{}.run", self.name);
        let id = bus
            .schedule(label, async move { module.run(ctx, run_metadata).await })
            .await;
        *lock(&self.active_task) = Some(id);
        true
    }

    /// Back to passive; `run` observes the state change and returns.
    fn deactivate(&self) -> bool {
        if self.state() != ModuleState::Active {
            return false;
        }
        self.set_state(ModuleState::Passive);
        true
    }

    /// Detach the active-phase task and go inactive; `run_passively`
    /// observes the state change and returns.
    fn initiate_shutdown(&self) -> bool {
        if let Some(id) = lock(&self.active_task).take() {
            debug!(module = %self.name, task = id, "detached active-phase task");
        }
        let was_ready = self.is_ready();
        self.set_state(ModuleState::Inactive);
        was_ready
    }

    /// Wait for the passive-phase task to finish.
    ///
    /// # Panics
    ///
    /// Panics if the active-phase task handle is still set, i.e.
    /// `initiate_shutdown` did not run before.
    async fn finalize_shutdown(&self, bus: &Bus) -> bool {
        assert!(
            self.active_task().is_none(),
            "finalize_shutdown of module [{}] while its active-phase task is still set",
            self.name
        );

        let passive = lock(&self.passive_task).take();
        if let Some(id) = passive {
            debug!(module = %self.name, task = id, "waiting for passive-phase task");
            bus.wait_for_task(id).await;
        }
        passive.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configuration;

    struct Idle;

    impl AppModule for Idle {}

    fn slot() -> ModuleSlot {
        ModuleSlot::new(Arc::from("idle"), Arc::new(Idle), ModuleSlot::state_channel())
    }

    #[tokio::test]
    #[should_panic(expected = "active-phase task is still set")]
    async fn finalize_with_active_task_set_panics() {
        let bus = Bus::new(Configuration::default());
        let slot = slot();
        *lock(&slot.active_task) = Some(7);

        slot.run_lifecycle(&bus, Lifecycle::FinalizeShutdown, &Metadata::from_manager())
            .await;
    }

    #[tokio::test]
    async fn initiate_shutdown_clears_the_active_task() {
        let bus = Bus::new(Configuration::default());
        let slot = slot();
        slot.set_state(ModuleState::Active);
        *lock(&slot.active_task) = Some(7);
        let metadata = Metadata::from_manager();

        slot.run_lifecycle(&bus, Lifecycle::InitiateShutdown, &metadata).await;
        assert_eq!(slot.active_task(), None);
        assert_eq!(slot.state(), ModuleState::Inactive);

        slot.run_lifecycle(&bus, Lifecycle::FinalizeShutdown, &metadata).await;
        assert_eq!(slot.passive_task(), None);
    }
}
