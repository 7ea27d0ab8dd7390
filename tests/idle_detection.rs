// tests/idle_detection.rs

mod common;
use crate::common::{
    ConfigBuilder, Journal, Recorder, TestResult, init_tracing, recorder, register, serve_with,
    wait_for_state, wait_until, with_timeout,
};

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use modulebus::kwargs::Kwargs;
use modulebus::manager::ModuleManager;
use modulebus::metadata::Metadata;
use modulebus::types::ModuleState;

fn greet(text: &str) -> Kwargs {
    Kwargs::new().with("text", text)
}

#[tokio::test]
async fn becoming_idle_is_announced_once_per_drain() -> TestResult {
    init_tracing();
    let journal = Journal::new();
    let idle = Arc::new(AtomicUsize::new(0));
    let manager = ModuleManager::new(
        ConfigBuilder::new().build(),
        vec![
            register(Recorder::new("a", journal.clone()).with_idle_counter(Arc::clone(&idle))),
            recorder("b", &journal),
        ],
    )?;

    let observer = journal.clone();
    let counter = Arc::clone(&idle);
    let seen = with_timeout(serve_with(&manager, |bus| async move {
        wait_for_state(&bus, "b", ModuleState::Active).await;
        let mut seen = vec![counter.load(Ordering::SeqCst)];

        bus.enqueue_task("b.greet".into(), Metadata::default(), greet("one"));
        wait_until(|| observer.count("b:greet one") == 1).await;
        wait_until(|| counter.load(Ordering::SeqCst) == 1).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        seen.push(counter.load(Ordering::SeqCst));

        // Both items are queued before the loop runs again: one drain.
        bus.enqueue_task("b.greet".into(), Metadata::default(), greet("two"));
        bus.enqueue_task("b.greet".into(), Metadata::default(), greet("three"));
        wait_until(|| observer.count("b:greet three") == 1).await;
        wait_until(|| counter.load(Ordering::SeqCst) == 2).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        seen.push(counter.load(Ordering::SeqCst));
        seen
    }))
    .await;

    assert_eq!(seen, vec![0, 1, 2]);
    // The exit item drains the queue one last time.
    assert_eq!(idle.load(Ordering::SeqCst), 3);
    Ok(())
}

#[tokio::test]
async fn loop_keeps_running_until_tasks_in_flight_at_exit_finish() -> TestResult {
    init_tracing();
    let journal = Journal::new();
    let manager = ModuleManager::new(ConfigBuilder::new().build(), vec![recorder("a", &journal)])?;
    let bus = manager.handle();

    with_timeout(serve_with(&manager, |bus| async move {
        wait_for_state(&bus, "a", ModuleState::Active).await;
        bus.enqueue_task("a.hold".into(), Metadata::default(), Kwargs::new().with("ms", 300));
        // serve_with requests shutdown right after this returns.
    }))
    .await;

    assert_eq!(journal.count("a:hold"), 1);
    let finalized = journal.position("a:finalize_shutdown").unwrap();
    let held = journal.position("a:hold").unwrap();
    assert!(finalized < held, "hold outlived the shutdown lifecycle: {:?}", journal.entries());
    assert!(bus.is_exiting());
    assert_eq!(bus.tasks().in_flight(), 0);
    assert!(bus.running_task_labels().is_empty());
    Ok(())
}
