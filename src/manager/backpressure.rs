// src/manager/backpressure.rs

use std::time::Duration;

use tracing::{trace, warn};

use crate::config::BusSection;

/// Throttles new background tasks while too many are in flight.
///
/// While `in_flight() > limit` the caller sleeps, starting at `start` and
/// doubling each round up to `cap`. Once a sleep of `cap` has been served
/// the wait is abandoned with a warning and the task starts anyway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backpressure {
    limit: usize,
    start: Duration,
    cap: Duration,
}

impl Backpressure {
    pub fn new(limit: usize, start: Duration, cap: Duration) -> Self {
        Self { limit, start, cap }
    }

    /// Limit of `tasks_per_module * module_count` with the configured delays.
    pub fn from_config(bus: &BusSection, module_count: usize) -> Self {
        Self::new(
            bus.tasks_per_module.saturating_mul(module_count),
            Duration::from_millis(bus.backoff_start_ms),
            Duration::from_millis(bus.backoff_cap_ms),
        )
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Delay following `delay`.
    pub fn next_delay(&self, delay: Duration) -> Duration {
        delay.saturating_mul(2).min(self.cap)
    }

    /// Sleep until `in_flight()` drops to the limit or the cap is reached.
    ///
    /// Returns the total time spent sleeping.
    pub async fn wait<F>(&self, label: &str, in_flight: F) -> Duration
    where
        F: Fn() -> usize,
    {
        let mut delay = self.start.max(Duration::from_millis(1)).min(self.cap);
        let mut waited = Duration::ZERO;

        while in_flight() > self.limit {
            trace!(task = %label, delay_ms = delay.as_millis() as u64, "too many tasks in flight; backing off");
            tokio::time::sleep(delay).await;
            waited += delay;

            if delay >= self.cap {
                warn!(
                    task = %label,
                    in_flight = in_flight(),
                    limit = self.limit,
                    waited_ms = waited.as_millis() as u64,
                    "long wait for free task slot; starting task anyway"
                );
                break;
            }
            delay = self.next_delay(delay);
        }

        waited
    }
}
