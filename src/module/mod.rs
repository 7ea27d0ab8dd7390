// src/module/mod.rs

//! Application modules.
//!
//! - [`AppModule`] is the trait application code implements: lifecycle hooks
//!   with default no-op bodies plus a [`HandlerTable`] of callable methods and
//!   event subscriptions.
//! - [`context`] holds the helper API a module uses to reach other modules.
//! - [`slot`] is the manager-owned lifecycle state machine wrapped around
//!   each registered module.

use std::fmt;
use std::sync::Arc;

use crate::metadata::Metadata;

pub mod context;
pub mod handlers;
pub mod slot;

pub use context::ModuleContext;
pub use handlers::{BoxFuture, Handler, HandlerResult, HandlerTable, event_handler_name};
pub use slot::ModuleSlot;

/// A unit of application logic participating in the bus.
///
/// All hooks are invoked by the manager, never by other modules.
pub trait AppModule: Send + Sync + 'static {
    /// One-time setup before the module leaves the inactive state.
    ///
    /// An error keeps this module inactive; other modules start normally.
    fn initialize<'a>(&'a self, _ctx: &'a ModuleContext) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async { Ok(()) })
    }

    /// Background task started on `startup`.
    ///
    /// Expected to be long-lived (serve requests, poll hardware). It must
    /// return once [`ModuleContext::stopped_being_ready`] resolves.
    fn run_passively(
        self: Arc<Self>,
        _ctx: ModuleContext,
        _metadata: Metadata,
    ) -> BoxFuture<'static, anyhow::Result<()>> {
        Box::pin(async { Ok(()) })
    }

    /// Background task started on `activate`; may initiate tasks and events
    /// on its own. Should return once [`ModuleContext::stopped_being_active`]
    /// resolves.
    fn run(self: Arc<Self>, _ctx: ModuleContext, _metadata: Metadata) -> BoxFuture<'static, anyhow::Result<()>> {
        Box::pin(async { Ok(()) })
    }

    /// Notification after a lifecycle step took effect on this module.
    fn on_lifecycle(&self, _ctx: &ModuleContext, _step: Lifecycle) {}

    /// Methods and event subscriptions offered by this module.
    fn handlers(self: Arc<Self>) -> HandlerTable {
        HandlerTable::new()
    }
}

/// Builds a module once its context exists.
pub type ModuleFactory = Box<dyn FnOnce(&ModuleContext) -> Arc<dyn AppModule> + Send>;

/// Wrap a constructor closure into a [`ModuleFactory`].
pub fn factory<M, F>(f: F) -> ModuleFactory
where
    M: AppModule,
    F: FnOnce(&ModuleContext) -> M + Send + 'static,
{
    Box::new(move |ctx| Arc::new(f(ctx)) as Arc<dyn AppModule>)
}

/// Lifecycle steps the manager broadcasts to every module, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    Startup,
    Activate,
    Deactivate,
    InitiateShutdown,
    FinalizeShutdown,
}

impl Lifecycle {
    pub fn as_str(self) -> &'static str {
        match self {
            Lifecycle::Startup => "startup",
            Lifecycle::Activate => "activate",
            Lifecycle::Deactivate => "deactivate",
            Lifecycle::InitiateShutdown => "initiate_shutdown",
            Lifecycle::FinalizeShutdown => "finalize_shutdown",
        }
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
