// src/config/mod.rs

//! Configuration loading and validation.
//!
//! Responsibilities:
//! - Define the TOML-backed model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate the `[bus]` section (`validate.rs`).
//!
//! A [`Configuration`] is built once and handed to the manager, which shares
//! it with every module context. There is no global configuration state.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, load_or_default};
pub use model::{BusSection, Configuration};
pub use validate::validate_bus_section;
