// src/module/handlers.rs

//! Per-module capability table.
//!
//! Every module declares, once at registration time, which methods it offers
//! to other modules and which events it subscribes to. The manager resolves
//! task targets and broadcasts against this table only; a name that is not in
//! the table is reported as unknown.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use crate::kwargs::Kwargs;
use crate::metadata::Metadata;
use crate::module::context::ModuleContext;

/// Boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a handler returns: a JSON value, or an error that is reported by the
/// manager (background tasks) or handed back to the caller (`exec_task`).
pub type HandlerResult = anyhow::Result<Value>;

/// Type-erased handler stored in the table.
pub type Handler =
    Arc<dyn Fn(ModuleContext, Metadata, Kwargs) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Method/event name → handler.
#[derive(Clone, Default)]
pub struct HandlerTable {
    entries: BTreeMap<String, Handler>,
}

impl fmt::Debug for HandlerTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an asynchronous method callable as `"<module>.<name>"`.
    pub fn method<F, Fut>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(ModuleContext, Metadata, Kwargs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |ctx, metadata, kwargs| Box::pin(f(ctx, metadata, kwargs)));
        self.entries.insert(name.to_string(), handler);
        self
    }

    /// Register a synchronous method; it runs directly on the dispatch
    /// thread, so it must not block.
    pub fn method_sync<F>(self, name: &str, f: F) -> Self
    where
        F: Fn(&ModuleContext, &Metadata, &Kwargs) -> HandlerResult + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.method(name, move |ctx, metadata, kwargs| {
            let f = Arc::clone(&f);
            async move { f(&ctx, &metadata, &kwargs) }
        })
    }

    /// Subscribe to event `event` (stored as handler `on_<event>`).
    pub fn event<F, Fut>(self, event: &str, f: F) -> Self
    where
        F: Fn(ModuleContext, Metadata, Kwargs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.method(&event_handler_name(event), f)
    }

    /// Synchronous variant of [`HandlerTable::event`].
    pub fn event_sync<F>(self, event: &str, f: F) -> Self
    where
        F: Fn(&ModuleContext, &Metadata, &Kwargs) -> HandlerResult + Send + Sync + 'static,
    {
        self.method_sync(&event_handler_name(event), f)
    }

    pub fn get(&self, name: &str) -> Option<&Handler> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// `E` → `on_E`.
pub fn event_handler_name(event: &str) -> String {
    format!("on_{event}")
}
