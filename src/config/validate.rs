// src/config/validate.rs

use crate::config::model::{BusSection, Configuration};
use crate::errors::{ModuleBusError, Result};

impl TryFrom<toml::Table> for Configuration {
    type Error = ModuleBusError;

    fn try_from(mut table: toml::Table) -> std::result::Result<Self, Self::Error> {
        let bus: BusSection = match table.remove("bus") {
            Some(value) => value.try_into().map_err(|e| {
                ModuleBusError::ConfigError(format!("invalid [bus] section: {e}"))
            })?,
            None => BusSection::default(),
        };

        validate_bus_section(&bus)?;
        Ok(Configuration::new_unchecked(bus, table))
    }
}

/// Check numeric sanity of the `[bus]` section.
pub fn validate_bus_section(bus: &BusSection) -> Result<()> {
    if bus.max_workers == 0 {
        return Err(ModuleBusError::ConfigError(
            "[bus].max_workers must be >= 1 (got 0)".to_string(),
        ));
    }

    if bus.tasks_per_module == 0 {
        return Err(ModuleBusError::ConfigError(
            "[bus].tasks_per_module must be >= 1 (got 0)".to_string(),
        ));
    }

    if bus.backoff_start_ms == 0 {
        return Err(ModuleBusError::ConfigError(
            "[bus].backoff_start_ms must be >= 1 (got 0)".to_string(),
        ));
    }

    if bus.backoff_cap_ms < bus.backoff_start_ms {
        return Err(ModuleBusError::ConfigError(format!(
            "[bus].backoff_cap_ms ({}) must not be smaller than backoff_start_ms ({})",
            bus.backoff_cap_ms, bus.backoff_start_ms
        )));
    }

    Ok(())
}
