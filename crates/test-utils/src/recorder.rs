//! Recording module used by the integration tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use modulebus::kwargs::Kwargs;
use modulebus::module::{AppModule, BoxFuture, HandlerTable, Lifecycle, ModuleContext, ModuleFactory, factory};
use serde_json::{Value, json};

/// Shared, ordered record of what recorders observed.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.entries().iter().filter(|e| *e == entry).count()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }

    /// Entries starting with `prefix`, in order.
    pub fn with_prefix(&self, prefix: &str) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|e| e.starts_with(prefix))
            .collect()
    }
}

/// Module that records lifecycle steps and handler calls as
/// `"<name>:<what>"` entries.
///
/// Methods: `compute(x) -> 2x`, `greet(text)`, `fail`, `panic`,
/// `hold(ms)`, `forward(target, text)`, `compute_in_thread(target, x)`.
/// Events: `ping`, `exit`, `becoming_idle`.
pub struct Recorder {
    name: String,
    journal: Journal,
    fail_initialize: bool,
    idle_count: Arc<AtomicUsize>,
}

impl Recorder {
    pub fn new(name: &str, journal: Journal) -> Self {
        Self {
            name: name.to_string(),
            journal,
            fail_initialize: false,
            idle_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing_initialize(mut self) -> Self {
        self.fail_initialize = true;
        self
    }

    pub fn with_idle_counter(mut self, counter: Arc<AtomicUsize>) -> Self {
        self.idle_count = counter;
        self
    }

    fn record(&self, what: impl AsRef<str>) {
        self.journal.record(format!("{}:{}", self.name, what.as_ref()));
    }
}

/// Registration entry for a recorder named `name`.
pub fn recorder(name: &str, journal: &Journal) -> (String, ModuleFactory) {
    let recorder = Recorder::new(name, journal.clone());
    (name.to_string(), factory(move |_ctx: &ModuleContext| recorder))
}

/// Registration entry for an already configured recorder.
pub fn register(recorder: Recorder) -> (String, ModuleFactory) {
    (recorder.name.clone(), factory(move |_ctx: &ModuleContext| recorder))
}

impl AppModule for Recorder {
    fn initialize<'a>(&'a self, _ctx: &'a ModuleContext) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.record("initialize");
            if self.fail_initialize {
                return Err(anyhow!("initialize refused by recorder"));
            }
            Ok(())
        })
    }

    fn on_lifecycle(&self, _ctx: &ModuleContext, step: Lifecycle) {
        self.record(step.as_str());
    }

    fn handlers(self: Arc<Self>) -> HandlerTable {
        let greet = Arc::clone(&self);
        let ping = Arc::clone(&self);
        let exit = Arc::clone(&self);
        let hold = Arc::clone(&self);
        let idle = Arc::clone(&self.idle_count);

        HandlerTable::new()
            .method_sync("compute", |_ctx, _md, kwargs| {
                let x: i64 = kwargs.require("x")?;
                Ok(json!(x * 2))
            })
            .method_sync("greet", move |_ctx, _md, kwargs| {
                let text: String = kwargs.require("text")?;
                greet.record(format!("greet {text}"));
                Ok(json!(text))
            })
            .method_sync("fail", |_ctx, _md, _kwargs| Err(anyhow!("recorder failure")))
            .method_sync("panic", |_ctx, _md, _kwargs| panic!("recorder panic"))
            .method("hold", move |_ctx, _md, kwargs| {
                let hold = Arc::clone(&hold);
                async move {
                    let ms: u64 = kwargs.get("ms").unwrap_or(10);
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    hold.record("hold");
                    anyhow::Ok(Value::Null)
                }
            })
            .method_sync("forward", |ctx, md, kwargs| {
                let target: String = kwargs.require("target")?;
                let text: String = kwargs.require("text")?;
                ctx.enqueue_task(&target, Kwargs::new().with("text", text), Some(md.clone()));
                Ok(Value::Null)
            })
            .method("compute_in_thread", |ctx, md, kwargs| async move {
                let target: String = kwargs.require("target")?;
                let x: i64 = kwargs.require("x")?;
                let worker = ctx.clone();
                let handle = ctx.bus().spawn_blocking("compute_in_thread", move || {
                    worker.exec_task_threadsafe(&target, Kwargs::new().with("x", x), Some(md))
                })?;
                let result = handle.await??;
                anyhow::Ok(result.unwrap_or(Value::Null))
            })
            .event_sync("ping", move |_ctx, md, _kwargs| {
                ping.record(format!("on_ping from {}", md.source_name()));
                Ok(Value::Null)
            })
            .event_sync("exit", move |_ctx, _md, _kwargs| {
                exit.record("on_exit");
                Ok(Value::Null)
            })
            .event_sync("becoming_idle", move |_ctx, _md, _kwargs| {
                idle.fetch_add(1, Ordering::SeqCst);
                Ok(Value::Null)
            })
    }
}

/// Module without any handlers or hooks.
pub struct Silent;

impl AppModule for Silent {}
