// src/config/loader.rs

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config::model::Configuration;
use crate::errors::Result;

/// Load a configuration file and return the raw TOML document.
///
/// This only performs TOML deserialization; it does **not** validate the
/// `[bus]` section. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<toml::Table> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let table: toml::Table = toml::from_str(&contents)?;

    Ok(table)
}

/// Load a configuration file from path and validate it.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<Configuration> {
    let table = load_from_path(&path)?;
    let config = Configuration::try_from(table)?;
    debug!(path = %path.as_ref().display(), "configuration loaded");
    Ok(config)
}

/// Like [`load_and_validate`], but a missing file yields the defaults
/// (with a warning) instead of an error.
pub fn load_or_default(path: impl AsRef<Path>) -> Result<Configuration> {
    let path = path.as_ref();
    match load_and_validate(path) {
        Err(crate::errors::ModuleBusError::IoError(e)) if e.kind() == ErrorKind::NotFound => {
            warn!(path = %path.display(), "config file not found; just using defaults");
            Ok(Configuration::default())
        }
        other => other,
    }
}

/// Default config location: `modulebus.toml` in the working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("modulebus.toml")
}
