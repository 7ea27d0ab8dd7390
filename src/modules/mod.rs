// src/modules/mod.rs

//! Modules shipped with the `modulebus` binary.
//!
//! - [`greeter`]: plain module offering `greet` and `compute`, reacting to
//!   `tick` events.
//! - [`ticker`]: threaded module emitting `tick` events from a worker thread
//!   until it is deactivated.

pub mod greeter;
pub mod ticker;

pub use greeter::Greeter;
pub use ticker::Ticker;

use crate::module::{ModuleFactory, factory};

/// The demo module set, in registration order.
pub fn default_modules() -> Vec<(String, ModuleFactory)> {
    vec![
        (greeter::NAME.to_string(), factory(Greeter::new)),
        (ticker::NAME.to_string(), factory(Ticker::new)),
    ]
}
