pub mod builders;
pub mod recorder;

use std::future::Future;
use std::io;
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use modulebus::manager::ModuleManager;
use modulebus::{Bus, ModuleState};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Run `f` with a thread-local subscriber and return what it logged.
///
/// Only events emitted on the calling thread while `f` runs are captured.
pub fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = fmt()
        .with_max_level(LevelFilter::DEBUG)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();

    let out = {
        let _guard = subscriber.set_default();
        f()
    };
    let text = String::from_utf8_lossy(&logs.0.lock().unwrap()).into_owned();
    (out, text)
}

/// Run a future with a 5-second timeout.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: Future<Output = T>,
{
    tokio::time::timeout(Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// Serve `manager` on the current task while `driver` runs next to it.
///
/// Both share the dispatch thread. Once the driver finished, shutdown is
/// requested and this returns after the dispatch loop stopped.
pub async fn serve_with<F, Fut, T>(manager: &ModuleManager, driver: F) -> T
where
    F: FnOnce(Bus) -> Fut,
    Fut: Future<Output = T>,
{
    let bus = manager.handle();
    let drive = async move {
        let out = driver(bus.clone()).await;
        bus.shutdown();
        out
    };
    let (served, out) = tokio::join!(manager.serve(), drive);
    served.expect("manager failed to serve");
    out
}

/// Poll until `predicate` holds, sleeping 1 ms between checks.
pub async fn wait_until<P>(mut predicate: P)
where
    P: FnMut() -> bool,
{
    while !predicate() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

/// Poll until module `name` reached `state`.
pub async fn wait_for_state(bus: &Bus, name: &str, state: ModuleState) {
    wait_until(|| bus.module_state(name) == Some(state)).await;
}
