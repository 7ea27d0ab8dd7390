// tests/task_failures.rs

mod common;
use crate::common::{
    ConfigBuilder, Journal, TestResult, init_tracing, recorder, serve_with, wait_for_state,
    wait_until, with_timeout,
};

use std::fs;

use anyhow::anyhow;
use regex::Regex;
use tempfile::tempdir;

use modulebus::kwargs::Kwargs;
use modulebus::manager::{ModuleManager, TaskOutcome};
use modulebus::manager::tasks::append_exception_report;
use modulebus::metadata::Metadata;
use modulebus::types::ModuleState;

fn empty_manager() -> ModuleManager {
    ModuleManager::new(ConfigBuilder::new().build(), Vec::new()).unwrap()
}

#[tokio::test]
async fn outcomes_are_recorded_per_task() -> TestResult {
    init_tracing();
    let manager = empty_manager();
    let bus = manager.handle();

    let ok = bus.register_task(tokio::spawn(async { anyhow::Ok(()) }), "fine".into())?;
    let failed = bus.register_task(
        tokio::spawn(async { Err::<(), _>(anyhow!("boom").context("while testing")) }),
        "broken".into(),
    )?;
    let panicked = bus.register_task(
        tokio::spawn(async {
            if true {
                panic!("kaboom");
            }
            anyhow::Ok(())
        }),
        "panicky".into(),
    )?;

    with_timeout(bus.tasks().wait_all()).await;
    let mut finished = bus.tasks().reap();
    finished.sort_by_key(|t| t.id);

    assert_eq!(finished.len(), 3);
    assert_eq!((finished[0].id, &finished[0].outcome), (ok, &TaskOutcome::Success));

    assert_eq!(finished[1].id, failed);
    assert_eq!(finished[1].label, "broken");
    match &finished[1].outcome {
        TaskOutcome::Failed(report) => {
            assert!(report.contains("while testing"));
            assert!(report.contains("boom"));
        }
        other => panic!("expected failure, got {other:?}"),
    }

    assert_eq!(finished[2].id, panicked);
    assert_eq!(finished[2].outcome, TaskOutcome::Panicked("kaboom".to_string()));

    assert!(bus.tasks().reap().is_empty(), "reap drains the finished set");
    Ok(())
}

#[tokio::test]
async fn abort_marks_running_tasks_cancelled() -> TestResult {
    init_tracing();
    let manager = empty_manager();
    let bus = manager.handle();

    let id = bus.register_task(
        tokio::spawn(async {
            std::future::pending::<()>().await;
            anyhow::Ok(())
        }),
        "forever".into(),
    )?;
    assert_eq!(bus.running_task_labels(), vec!["forever"]);
    assert!(bus.tasks().is_running(id));

    bus.abort();
    with_timeout(bus.wait_for_task(id)).await;

    let finished = bus.tasks().reap();
    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0].outcome, TaskOutcome::Cancelled);
    assert!(!finished[0].outcome.is_failure());
    Ok(())
}

#[tokio::test]
async fn failed_tasks_are_logged_and_loop_survives() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let log_path = dir.path().join("exceptions.log");

    let journal = Journal::new();
    let manager = ModuleManager::new(
        ConfigBuilder::new().with_exception_log(&log_path).build(),
        vec![recorder("a", &journal), recorder("b", &journal)],
    )?;

    let observer = journal.clone();
    with_timeout(serve_with(&manager, |bus| async move {
        wait_for_state(&bus, "b", ModuleState::Active).await;
        bus.enqueue_task("a.fail".into(), Metadata::default(), Kwargs::new());
        bus.enqueue_task("a.panic".into(), Metadata::default(), Kwargs::new());
        bus.enqueue_task("b.greet".into(), Metadata::default(), Kwargs::new().with("text", "still here"));
        wait_until(|| observer.count("b:greet still here") == 1).await;
    }))
    .await;

    let contents = fs::read_to_string(&log_path)?;
    assert!(contents.contains("recorder failure"), "missing error report:\n{contents}");
    assert!(contents.contains("recorder panic"), "missing panic report:\n{contents}");
    assert!(contents.contains("a.fail"));

    let timestamp = Regex::new(r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}\.\d{6}$")?;
    let stamps = contents.lines().filter(|line| timestamp.is_match(line)).count();
    assert_eq!(stamps, 2, "expected one timestamp per report:\n{contents}");
    assert!(contents.ends_with("\n\n"));
    Ok(())
}

#[test]
fn exception_log_write_failure_is_not_fatal() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing-dir").join("exceptions.log");

    append_exception_report(&path, "x.y", &TaskOutcome::Failed("boom".into()));

    assert!(!path.exists());
}
