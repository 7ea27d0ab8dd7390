use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Dequeue priority of a task or event.
///
/// Lower ordinal wins: `Highest` items are always taken from the queue before
/// `Lowest` ones, regardless of arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Highest = 1,
    High = 2,
    Normal = 3,
    Low = 4,
    Lowest = 5,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Priority::Highest => "highest",
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
            Priority::Lowest => "lowest",
        };
        f.write_str(s)
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "highest" => Ok(Priority::Highest),
            "high" => Ok(Priority::High),
            "normal" => Ok(Priority::Normal),
            "low" => Ok(Priority::Low),
            "lowest" => Ok(Priority::Lowest),
            other => Err(format!(
                "invalid priority: {other} (expected one of highest, high, normal, low, lowest)"
            )),
        }
    }
}

/// Lifecycle state of a registered module.
///
/// Transitions are strictly ordered:
/// `Inactive -> Passive -> Active -> Passive -> Inactive`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ModuleState {
    /// Not ready for sending or receiving event notifications.
    #[default]
    Inactive,
    /// Receives tasks and events, should only initiate work to handle them.
    Passive,
    /// Receives and actively initiates tasks and events.
    Active,
}

impl ModuleState {
    /// Passive or active modules accept tasks.
    pub fn is_ready(self) -> bool {
        matches!(self, ModuleState::Passive | ModuleState::Active)
    }

    pub fn is_active(self) -> bool {
        self == ModuleState::Active
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModuleState::Inactive => "inactive",
            ModuleState::Passive => "passive",
            ModuleState::Active => "active",
        };
        f.write_str(s)
    }
}

/// Whether a broadcast schedules its handlers as background tasks or awaits
/// each one before moving to the next module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastMode {
    Concurrent,
    Sequential,
}
