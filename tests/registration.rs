// tests/registration.rs

mod common;
use crate::common::{ConfigBuilder, Journal, Silent, init_tracing, recorder};

use modulebus::errors::ModuleBusError;
use modulebus::manager::ModuleManager;
use modulebus::module::factory;

#[test]
fn module_names_keep_registration_order() {
    init_tracing();
    let journal = Journal::new();
    let manager = ModuleManager::new(
        ConfigBuilder::new().build(),
        vec![recorder("zeta", &journal), recorder("alpha", &journal), recorder("mid", &journal)],
    )
    .unwrap();

    let bus = manager.handle();
    assert_eq!(bus.module_names(), vec!["zeta", "alpha", "mid"]);
    assert_eq!(bus.module_count(), 3);
    assert!(bus.module("alpha").unwrap().handlers().contains("compute"));
    assert!(bus.module("alpha").unwrap().handlers().contains("on_ping"));
    assert!(!bus.is_ready_module("alpha"));
    assert!(!bus.is_ready_module("unknown"));
}

#[test]
fn dotted_module_name_is_rejected() {
    let result = ModuleManager::new(
        ConfigBuilder::new().build(),
        vec![("bad.name".to_string(), factory(|_| Silent))],
    );
    assert!(matches!(result, Err(ModuleBusError::InvalidModuleName(name)) if name == "bad.name"));
}

#[test]
fn empty_module_name_is_rejected() {
    let result = ModuleManager::new(ConfigBuilder::new().build(), vec![(String::new(), factory(|_| Silent))]);
    assert!(matches!(result, Err(ModuleBusError::InvalidModuleName(_))));
}

#[test]
fn duplicate_module_name_is_rejected() {
    let result = ModuleManager::new(
        ConfigBuilder::new().build(),
        vec![
            ("twin".to_string(), factory(|_| Silent)),
            ("twin".to_string(), factory(|_| Silent)),
        ],
    );
    assert!(matches!(result, Err(ModuleBusError::DuplicateModule(name)) if name == "twin"));
}

#[test]
fn factories_see_their_own_context() {
    let config = ConfigBuilder::new().with_item("recorder.factor", 3i64).build();
    let manager = ModuleManager::new(
        config,
        vec![(
            "recorder".to_string(),
            factory(|ctx| {
                assert_eq!(ctx.name(), "recorder");
                assert_eq!(ctx.get_config("factor", 1i64), 3);
                assert_eq!(ctx.get_config("missing", 7i64), 7);
                Silent
            }),
        )],
    );
    assert!(manager.is_ok());
}
