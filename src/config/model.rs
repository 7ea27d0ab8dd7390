// src/config/model.rs

use std::path::PathBuf;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [bus]
/// exception_log = "./exceptions.log"
/// max_workers = 10
///
/// [greeter]
/// greeting = "hello"
/// greet_every = 5
/// ```
///
/// `[bus]` configures the orchestration core. Every other top-level table
/// belongs to the module of the same name and is read through
/// [`Configuration::get_item`].
#[derive(Debug, Clone, Default)]
pub struct Configuration {
    bus: BusSection,
    table: toml::Table,
}

/// `[bus]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct BusSection {
    /// File receiving a report for every failed background task.
    #[serde(default)]
    pub exception_log: Option<PathBuf>,

    /// Size of the blocking worker pool used by threaded modules.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Backpressure kicks in once in-flight tasks exceed
    /// `tasks_per_module * <number of modules>`.
    #[serde(default = "default_tasks_per_module")]
    pub tasks_per_module: usize,

    /// First backpressure delay in milliseconds; doubled on every retry.
    #[serde(default = "default_backoff_start_ms")]
    pub backoff_start_ms: u64,

    /// Delay after which a waiting task is started regardless.
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,
}

fn default_max_workers() -> usize {
    10
}

fn default_tasks_per_module() -> usize {
    3
}

fn default_backoff_start_ms() -> u64 {
    1
}

fn default_backoff_cap_ms() -> u64 {
    1000
}

impl Default for BusSection {
    fn default() -> Self {
        Self {
            exception_log: None,
            max_workers: default_max_workers(),
            tasks_per_module: default_tasks_per_module(),
            backoff_start_ms: default_backoff_start_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
        }
    }
}

impl Configuration {
    /// Build from already-validated parts. Use
    /// [`crate::config::load_and_validate`] or `TryFrom<toml::Table>` for
    /// checked construction.
    pub(crate) fn new_unchecked(bus: BusSection, table: toml::Table) -> Self {
        Self { bus, table }
    }

    pub fn bus(&self) -> &BusSection {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut BusSection {
        &mut self.bus
    }

    /// The whole parsed document.
    pub fn table(&self) -> &toml::Table {
        &self.table
    }

    /// Raw lookup of a dotted key (`"greeter.greeting"`).
    ///
    /// Empty tables count as absent.
    pub fn get_value(&self, dotted_key: &str) -> Option<&toml::Value> {
        let mut parts = dotted_key.split('.');
        let first = parts.next()?;
        let mut current = self.table.get(first)?;

        for part in parts {
            current = match current {
                toml::Value::Table(t) => t.get(part)?,
                toml::Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }

        match current {
            toml::Value::Table(t) if t.is_empty() => None,
            other => Some(other),
        }
    }

    /// Typed lookup of a dotted key, falling back to `default` when the key
    /// is absent or cannot be converted to `T`.
    pub fn get_item<T: DeserializeOwned>(&self, dotted_key: &str, default: T) -> T {
        match self.get_value(dotted_key) {
            Some(value) => match value.clone().try_into() {
                Ok(v) => v,
                Err(e) => {
                    debug!(key = dotted_key, error = %e, "config item has unexpected type; using default");
                    default
                }
            },
            None => default,
        }
    }

    /// Set a dotted key, creating intermediate tables as needed.
    ///
    /// Returns `false` if an intermediate key exists but is not a table.
    pub fn set_item(&mut self, dotted_key: &str, value: impl Into<toml::Value>) -> bool {
        let parts: Vec<&str> = dotted_key.split('.').collect();
        let Some((last, parents)) = parts.split_last() else {
            return false;
        };

        let mut current = &mut self.table;
        for part in parents {
            let entry = current
                .entry(part.to_string())
                .or_insert_with(|| toml::Value::Table(toml::Table::new()));
            current = match entry {
                toml::Value::Table(t) => t,
                _ => return false,
            };
        }

        current.insert(last.to_string(), value.into());
        true
    }
}
