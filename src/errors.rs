// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModuleBusError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Invalid module name: {0}")]
    InvalidModuleName(String),

    #[error("Module registered twice: {0}")]
    DuplicateModule(String),

    /// A handler invoked synchronously through `exec_task` failed.
    #[error("Handler for [{target}] failed: {source:#}")]
    Handler {
        target: String,
        #[source]
        source: anyhow::Error,
    },

    /// The dispatch loop is not (or no longer) reachable over the bridge.
    #[error("Cross-thread bridge unavailable: {0}")]
    Bridge(String),

    /// A blocking `_threadsafe` helper was called on the dispatch thread.
    #[error("Blocking call [{0}] issued on the dispatch thread")]
    WrongThread(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, ModuleBusError>;
