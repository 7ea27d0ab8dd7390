// src/modules/greeter.rs

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{Value, json};
use tracing::info;

use crate::kwargs::Kwargs;
use crate::metadata::Metadata;
use crate::module::{AppModule, BoxFuture, HandlerTable, ModuleContext};

pub const NAME: &str = "greeter";

/// Greets on request and every `greeter.greet_every` ticks.
#[derive(Debug)]
pub struct Greeter {
    greeting: String,
    greet_every: u64,
    ticks: AtomicU64,
}

impl Greeter {
    pub fn new(ctx: &ModuleContext) -> Self {
        Self {
            greeting: ctx.get_config("greeting", "hello".to_string()),
            greet_every: ctx.get_config("greet_every", 5u64).max(1),
            ticks: AtomicU64::new(0),
        }
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    fn on_tick(&self, ctx: &ModuleContext, metadata: &Metadata) -> anyhow::Result<Value> {
        let ticks = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;
        if ticks % self.greet_every == 0 {
            let text = format!("{} after {ticks} ticks", self.greeting);
            ctx.enqueue_task("greet", Kwargs::new().with("text", text), Some(metadata.clone()));
        }
        Ok(Value::Null)
    }
}

fn compute(kwargs: &Kwargs) -> anyhow::Result<Value> {
    let x: i64 = kwargs.require("x")?;
    Ok(json!(x * 2))
}

impl AppModule for Greeter {
    fn run(self: Arc<Self>, ctx: ModuleContext, metadata: Metadata) -> BoxFuture<'static, anyhow::Result<()>> {
        Box::pin(async move {
            ctx.enqueue_task("greet", Kwargs::new().with("text", self.greeting.clone()), Some(metadata));
            ctx.stopped_being_active().await;
            Ok(())
        })
    }

    fn handlers(self: Arc<Self>) -> HandlerTable {
        let this = Arc::clone(&self);
        HandlerTable::new()
            .method("greet", |ctx, metadata, kwargs| async move {
                let text: String = kwargs.require("text")?;
                info!(module = %ctx.name(), transaction = %metadata.transaction_id(), "greeting: {text}");
                anyhow::Ok(json!(text))
            })
            .method_sync("compute", |_ctx, _metadata, kwargs| compute(kwargs))
            .event_sync("tick", move |ctx, metadata, _kwargs| this.on_tick(ctx, metadata))
            .event_sync("exit", |ctx, _metadata, _kwargs| {
                info!(module = %ctx.name(), "goodbye");
                Ok(Value::Null)
            })
    }
}
