// tests/routing.rs

mod common;
use crate::common::{
    ConfigBuilder, Journal, TestResult, init_tracing, recorder, serve_with, wait_for_state,
    wait_until, with_timeout,
};

use serde_json::json;

use modulebus::errors::ModuleBusError;
use modulebus::kwargs::Kwargs;
use modulebus::manager::ModuleManager;
use modulebus::metadata::Metadata;
use modulebus::types::{BroadcastMode, ModuleState};

fn three_recorders(journal: &Journal) -> ModuleManager {
    ModuleManager::new(
        ConfigBuilder::new().build(),
        vec![recorder("a", journal), recorder("b", journal), recorder("c", journal)],
    )
    .unwrap()
}

#[tokio::test]
async fn exec_task_returns_handler_result() -> TestResult {
    init_tracing();
    let journal = Journal::new();
    let manager = three_recorders(&journal);

    let result = with_timeout(serve_with(&manager, |bus| async move {
        wait_for_state(&bus, "c", ModuleState::Active).await;
        bus.exec_task("b.compute", Metadata::from_module("a"), Kwargs::new().with("x", 5))
            .await
    }))
    .await?;

    assert_eq!(result, Some(json!(10)));
    Ok(())
}

#[tokio::test]
async fn unresolvable_targets_yield_none() -> TestResult {
    init_tracing();
    let journal = Journal::new();
    let manager = three_recorders(&journal);

    let results = with_timeout(serve_with(&manager, |bus| async move {
        wait_for_state(&bus, "c", ModuleState::Active).await;
        let mut results = Vec::new();
        for target in ["nobody.compute", "a.no_such_method", "no_dot_at_all"] {
            results.push(bus.exec_task(target, Metadata::default(), Kwargs::new()).await);
        }
        results
    }))
    .await;

    for result in results {
        assert!(matches!(result, Ok(None)), "expected Ok(None), got {result:?}");
    }
    Ok(())
}

#[tokio::test]
async fn handler_error_is_returned_to_caller() -> TestResult {
    init_tracing();
    let journal = Journal::new();
    let manager = three_recorders(&journal);

    let result = with_timeout(serve_with(&manager, |bus| async move {
        wait_for_state(&bus, "c", ModuleState::Active).await;
        bus.exec_task("a.fail", Metadata::default(), Kwargs::new()).await
    }))
    .await;

    match result {
        Err(ModuleBusError::Handler { target, source }) => {
            assert_eq!(target, "a.fail");
            assert!(source.to_string().contains("recorder failure"));
        }
        other => panic!("expected handler error, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn threadsafe_exec_matches_direct_exec() -> TestResult {
    init_tracing();
    let journal = Journal::new();
    let manager = three_recorders(&journal);

    let (direct, threaded, external) = with_timeout(serve_with(&manager, |bus| async move {
        wait_for_state(&bus, "c", ModuleState::Active).await;

        let direct = bus
            .exec_task("b.compute", Metadata::default(), Kwargs::new().with("x", 21))
            .await
            .unwrap();

        // a's handler hops to a worker thread which calls back in.
        let threaded = bus
            .exec_task(
                "a.compute_in_thread",
                Metadata::default(),
                Kwargs::new().with("target", "b.compute").with("x", 21),
            )
            .await
            .unwrap();

        // Plain blocking-pool thread, outside any module.
        let worker = bus.clone();
        let external = tokio::task::spawn_blocking(move || {
            worker.exec_task_threadsafe("b.compute", Metadata::default(), Kwargs::new().with("x", 21))
        })
        .await
        .unwrap()
        .unwrap();

        (direct, threaded, external)
    }))
    .await;

    assert_eq!(direct, Some(json!(42)));
    assert_eq!(threaded, direct);
    assert_eq!(external, direct);
    Ok(())
}

#[tokio::test]
async fn blocking_exec_on_dispatch_thread_is_refused() -> TestResult {
    init_tracing();
    let journal = Journal::new();
    let manager = three_recorders(&journal);

    let result = with_timeout(serve_with(&manager, |bus| async move {
        wait_for_state(&bus, "a", ModuleState::Active).await;
        bus.exec_task_threadsafe("a.compute", Metadata::default(), Kwargs::new().with("x", 1))
    }))
    .await;

    assert!(matches!(result, Err(ModuleBusError::WrongThread(target)) if target == "a.compute"));
    Ok(())
}

#[tokio::test]
async fn enqueued_task_reaches_its_target() -> TestResult {
    init_tracing();
    let journal = Journal::new();
    let manager = three_recorders(&journal);

    let observer = journal.clone();
    with_timeout(serve_with(&manager, |bus| async move {
        wait_for_state(&bus, "c", ModuleState::Active).await;
        // a.forward enqueues b.greet(text="hi") from inside a handler.
        bus.enqueue_task(
            "a.forward".to_string(),
            Metadata::default(),
            Kwargs::new().with("target", "b.greet").with("text", "hi"),
        );
        wait_until(|| observer.count("b:greet hi") == 1).await;
    }))
    .await;

    assert_eq!(journal.count("b:greet hi"), 1);
    assert_eq!(journal.count("a:greet hi"), 0);
    Ok(())
}

#[tokio::test]
async fn enqueue_from_foreign_thread_goes_through_bridge() -> TestResult {
    init_tracing();
    let journal = Journal::new();
    let manager = three_recorders(&journal);

    let observer = journal.clone();
    with_timeout(serve_with(&manager, |bus| async move {
        wait_for_state(&bus, "c", ModuleState::Active).await;
        let worker = bus.clone();
        std::thread::spawn(move || {
            worker.enqueue_task_threadsafe(
                "c.greet".to_string(),
                Metadata::default(),
                Kwargs::new().with("text", "from thread"),
            );
        })
        .join()
        .unwrap();
        wait_until(|| observer.count("c:greet from thread") == 1).await;
    }))
    .await;

    Ok(())
}

#[tokio::test]
async fn triggered_event_skips_its_source() -> TestResult {
    init_tracing();
    let journal = Journal::new();
    let manager = three_recorders(&journal);

    let observer = journal.clone();
    with_timeout(serve_with(&manager, |bus| async move {
        wait_for_state(&bus, "c", ModuleState::Active).await;
        bus.trigger_event("ping", Metadata::from_module("a"), Kwargs::new());
        wait_until(|| observer.with_prefix("b:on_ping").len() + observer.with_prefix("c:on_ping").len() == 2).await;
    }))
    .await;

    assert_eq!(journal.count("a:on_ping from a"), 0);
    assert_eq!(journal.count("b:on_ping from a"), 1);
    assert_eq!(journal.count("c:on_ping from a"), 1);
    Ok(())
}

#[tokio::test]
async fn sequential_broadcast_completes_before_returning() -> TestResult {
    init_tracing();
    let journal = Journal::new();
    let manager = three_recorders(&journal);

    let observer = journal.clone();
    let seen = with_timeout(serve_with(&manager, |bus| async move {
        wait_for_state(&bus, "c", ModuleState::Active).await;
        bus.broadcast_event("on_ping", Metadata::from_module("b"), Kwargs::new(), BroadcastMode::Sequential)
            .await;
        observer.entries().into_iter().filter(|e| e.contains("on_ping")).collect::<Vec<_>>()
    }))
    .await;

    assert_eq!(seen, vec!["a:on_ping from b", "c:on_ping from b"]);
    Ok(())
}
