// src/lib.rs

pub mod bridge;
pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod kwargs;
pub mod logging;
pub mod manager;
pub mod metadata;
pub mod module;
pub mod modules;
pub mod types;

use anyhow::Result;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::{Configuration, load_or_default, validate_bus_section};
use crate::manager::ModuleManager;

pub use crate::kwargs::Kwargs;
pub use crate::manager::Bus;
pub use crate::metadata::Metadata;
pub use crate::module::{AppModule, HandlerTable, ModuleContext};
pub use crate::types::{BroadcastMode, ModuleState, Priority};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading plus CLI overrides
/// - the demo module set
/// - the module manager, which owns the dispatch runtime and signal handling
pub fn run(args: CliArgs) -> Result<()> {
    let config = configuration_from_args(&args)?;

    if args.dry_run {
        print_dry_run(&config);
        return Ok(());
    }

    let manager = ModuleManager::new(config, modules::default_modules())?;
    info!(modules = ?manager.bus().module_names(), "starting module manager");
    manager.run()?;
    Ok(())
}

/// Load the config file named on the command line and apply overrides.
pub fn configuration_from_args(args: &CliArgs) -> Result<Configuration> {
    let mut config = load_or_default(&args.config)?;

    if let Some(path) = &args.exception_log {
        config.bus_mut().exception_log = Some(path.clone());
    }
    if let Some(n) = args.max_workers {
        config.bus_mut().max_workers = n;
    }
    validate_bus_section(config.bus())?;

    debug!(bus = ?config.bus(), "effective configuration");
    Ok(config)
}

fn print_dry_run(config: &Configuration) {
    let bus = config.bus();
    println!("modulebus dry-run");
    println!("  bus.max_workers = {}", bus.max_workers);
    println!("  bus.tasks_per_module = {}", bus.tasks_per_module);
    println!("  bus.backoff = {}ms .. {}ms", bus.backoff_start_ms, bus.backoff_cap_ms);
    match &bus.exception_log {
        Some(path) => println!("  bus.exception_log = {}", path.display()),
        None => println!("  bus.exception_log = (none)"),
    }
    println!();

    println!("modules:");
    for (name, _) in modules::default_modules() {
        let settings = config.table().get(&name).map(ToString::to_string).unwrap_or_default();
        if settings.trim().is_empty() {
            println!("  - {name}");
        } else {
            println!("  - {name}: {}", settings.trim());
        }
    }
}
