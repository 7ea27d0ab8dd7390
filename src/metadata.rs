// src/metadata.rs

//! Transaction metadata attached to every task and event.
//!
//! A [`Metadata`] value is created once per logical request and then passed
//! along to all work derived from it, so that follow-up tasks enqueued by a
//! handler share the transaction id of the request that caused them.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;

use crate::types::Priority;

/// Source name used for metadata created by the manager itself.
pub const MANAGER_SOURCE_NAME: &str = "modulemanager";

const COUNTER_MODULUS: u32 = 1_000_000;

/// Formatted second of the last generated id, plus the counter within it.
static ID_STATE: Mutex<Option<(String, u32)>> = Mutex::new(None);

/// Immutable correlation record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    transaction_id: Arc<str>,
    priority: Priority,
    source: Option<Arc<str>>,
    source_name: Arc<str>,
}

impl Metadata {
    /// Create metadata with a fresh transaction id.
    ///
    /// `priority` defaults to [`Priority::Normal`]. `source` is the name of the
    /// originating module (used for split horizon); `None` for the manager
    /// or external callers.
    pub fn new(priority: Option<Priority>, source: Option<&str>, source_name: Option<&str>) -> Self {
        Self {
            transaction_id: next_transaction_id().into(),
            priority: priority.unwrap_or_default(),
            source: source.map(Arc::from),
            source_name: source_name.or(source).unwrap_or("").into(),
        }
    }

    /// Metadata originating from the module with the given name.
    pub fn from_module(name: &str) -> Self {
        Self::new(None, Some(name), Some(name))
    }

    /// Metadata originating from the manager (no source module).
    pub fn from_manager() -> Self {
        Self::new(None, None, Some(MANAGER_SOURCE_NAME))
    }

    /// Same transaction, different priority.
    pub fn with_priority(&self, priority: Priority) -> Self {
        Self {
            priority,
            ..self.clone()
        }
    }

    pub fn transaction_id(&self) -> &str {
        &self.transaction_id
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Whether `module` is the originator of this transaction.
    pub fn is_from(&self, module: &str) -> bool {
        self.source.as_deref() == Some(module)
    }
}

impl Default for Metadata {
    fn default() -> Self {
        Self::new(None, None, None)
    }
}

impl fmt::Display for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] from {}",
            self.transaction_id, self.priority, self.source_name
        )
    }
}

/// Generate the next `<%Y%m%d-%H%M%S>-<counter>` transaction id.
///
/// The counter restarts at zero whenever the formatted UTC second changes.
/// It wraps around after 999999 ids within the same second.
pub fn next_transaction_id() -> String {
    let mut guard = ID_STATE.lock().unwrap_or_else(PoisonError::into_inner);
    // Read the clock under the lock so ids stay ordered across threads.
    let now = Utc::now().format("%Y%m%d-%H%M%S").to_string();

    let counter = match guard.as_mut() {
        Some((second, counter)) if *second == now => {
            *counter = (*counter + 1) % COUNTER_MODULUS;
            *counter
        }
        _ => {
            *guard = Some((now.clone(), 0));
            0
        }
    };

    format!("{now}-{counter:06}")
}
