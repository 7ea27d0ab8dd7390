// src/cli.rs

//! CLI argument parsing using `clap` (derive feature).

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `modulebus`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "modulebus",
    version,
    about = "Run application modules on a shared task and event bus.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// A missing file is not an error: built-in defaults are used.
    #[arg(long, value_name = "PATH", default_value = "modulebus.toml")]
    pub config: PathBuf,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `MODULEBUS_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Append reports of failed background tasks to this file
    /// (overrides `bus.exception_log`).
    #[arg(long, value_name = "PATH")]
    pub exception_log: Option<PathBuf>,

    /// Size of the worker pool for threaded modules
    /// (overrides `bus.max_workers`).
    #[arg(long, value_name = "N")]
    pub max_workers: Option<usize>,

    /// Load and validate the configuration, list the modules, don't run.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
