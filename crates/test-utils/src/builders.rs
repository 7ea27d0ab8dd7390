use std::path::PathBuf;

use modulebus::config::{Configuration, validate_bus_section};

/// Builder for `Configuration` to simplify test setup.
pub struct ConfigBuilder {
    config: Configuration,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Configuration::default(),
        }
    }

    pub fn with_exception_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.bus_mut().exception_log = Some(path.into());
        self
    }

    pub fn with_max_workers(mut self, n: usize) -> Self {
        self.config.bus_mut().max_workers = n;
        self
    }

    pub fn with_tasks_per_module(mut self, n: usize) -> Self {
        self.config.bus_mut().tasks_per_module = n;
        self
    }

    pub fn with_backoff_ms(mut self, start: u64, cap: u64) -> Self {
        self.config.bus_mut().backoff_start_ms = start;
        self.config.bus_mut().backoff_cap_ms = cap;
        self
    }

    /// Module setting, e.g. `("recorder.factor", 3)`.
    pub fn with_item(mut self, dotted_key: &str, value: impl Into<toml::Value>) -> Self {
        assert!(
            self.config.set_item(dotted_key, value),
            "cannot set config item {dotted_key}"
        );
        self
    }

    pub fn build(self) -> Configuration {
        validate_bus_section(self.config.bus()).expect("Failed to build valid config from builder");
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
