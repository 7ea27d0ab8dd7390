// src/modules/ticker.rs

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::kwargs::Kwargs;
use crate::metadata::Metadata;
use crate::module::{AppModule, BoxFuture, ModuleContext};

pub const NAME: &str = "ticker";

/// Threaded module: a worker thread triggers `tick` every
/// `ticker.interval_ms` while the module is active. Every third tick it asks
/// `greeter.compute` to double the count.
#[derive(Debug)]
pub struct Ticker {
    interval: Duration,
}

impl Ticker {
    pub fn new(ctx: &ModuleContext) -> Self {
        Self {
            interval: Duration::from_millis(ctx.get_config("interval_ms", 1000u64)),
        }
    }
}

fn tick_loop(ctx: ModuleContext, interval: Duration) -> anyhow::Result<()> {
    let mut count: u64 = 0;
    while ctx.is_active() {
        std::thread::sleep(interval);
        if !ctx.is_active() {
            break;
        }

        count += 1;
        ctx.trigger_event_threadsafe(Some("tick"), Kwargs::new().with("count", count), None);

        if count % 3 == 0 {
            match ctx.exec_task_threadsafe("greeter.compute", Kwargs::new().with("x", count), None) {
                Ok(Some(doubled)) => debug!(module = %ctx.name(), count, %doubled, "computed"),
                Ok(None) => warn!(module = %ctx.name(), "greeter.compute unavailable"),
                Err(e) => warn!(module = %ctx.name(), error = %e, "greeter.compute failed"),
            }
        }
    }
    debug!(module = %ctx.name(), count, "tick loop finished");
    Ok(())
}

impl AppModule for Ticker {
    fn run(self: Arc<Self>, ctx: ModuleContext, _metadata: Metadata) -> BoxFuture<'static, anyhow::Result<()>> {
        Box::pin(async move {
            let interval = self.interval;
            ctx.run_in_thread("tick loop", move |ctx| tick_loop(ctx, interval))?;
            ctx.stopped_being_active().await;
            Ok(())
        })
    }
}
