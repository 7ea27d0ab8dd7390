// tests/demo_modules.rs

mod common;
use crate::common::{ConfigBuilder, TestResult, init_tracing, serve_with, wait_for_state, wait_until, with_timeout};

use serde_json::json;

use modulebus::kwargs::Kwargs;
use modulebus::manager::ModuleManager;
use modulebus::metadata::Metadata;
use modulebus::modules::default_modules;
use modulebus::types::ModuleState;

#[tokio::test(flavor = "current_thread")]
async fn ticker_thread_runs_until_shutdown() -> TestResult {
    init_tracing();
    let config = ConfigBuilder::new()
        .with_item("ticker.interval_ms", 5i64)
        .with_item("greeter.greet_every", 2i64)
        .build();
    let manager = ModuleManager::new(config, default_modules())?;
    let bus = manager.handle();

    let doubled = with_timeout(serve_with(&manager, |bus| async move {
        wait_for_state(&bus, "ticker", ModuleState::Active).await;
        wait_until(|| bus.running_task_labels().iter().any(|l| l == "ticker: tick loop")).await;
        // Let a few ticks go by.
        tokio::time::sleep(std::time::Duration::from_millis(60)).await;
        bus.exec_task("greeter.compute", Metadata::default(), Kwargs::new().with("x", 21))
            .await
    }))
    .await?;

    assert_eq!(doubled, Some(json!(42)));
    assert!(bus.running_task_labels().is_empty(), "tick loop still running");
    assert_eq!(bus.module_state("ticker"), Some(ModuleState::Inactive));
    assert_eq!(bus.module_state("greeter"), Some(ModuleState::Inactive));
    Ok(())
}

#[tokio::test]
async fn greeter_rejects_bad_arguments() -> TestResult {
    init_tracing();
    let manager = ModuleManager::new(ConfigBuilder::new().with_item("ticker.interval_ms", 1000i64).build(), default_modules())?;

    let result = with_timeout(serve_with(&manager, |bus| async move {
        wait_for_state(&bus, "greeter", ModuleState::Active).await;
        bus.exec_task("greeter.compute", Metadata::default(), Kwargs::new().with("x", "five"))
            .await
    }))
    .await;

    let err = result.unwrap_err();
    assert!(err.to_string().contains("argument `x`"), "{err}");
    Ok(())
}
