//! Per-event-type processing statistics.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

/// Counters for one event type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProcessingStats {
    /// Events of this type whose dispatch completed.
    pub count: u64,
    /// Cumulative dispatch time.
    pub total_time: Duration,
    /// Failed callback invocations.
    pub errors: u64,
}

impl ProcessingStats {
    /// Mean dispatch time per event
    pub fn avg_time(&self) -> Duration {
        if self.count == 0 {
            return Duration::ZERO;
        }
        let nanos = self.total_time.as_nanos() / u128::from(self.count);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

#[derive(Debug, Default)]
pub(crate) struct StatsCollector {
    by_type: Mutex<HashMap<String, ProcessingStats>>,
}

impl StatsCollector {
    pub(crate) fn record_processed(&self, event_type: &str, elapsed: Duration) {
        let mut by_type = self.by_type.lock();
        let stats = by_type.entry(event_type.to_string()).or_default();
        stats.count += 1;
        stats.total_time += elapsed;
    }

    pub(crate) fn record_error(&self, event_type: &str) {
        let mut by_type = self.by_type.lock();
        by_type.entry(event_type.to_string()).or_default().errors += 1;
    }

    pub(crate) fn snapshot(&self) -> HashMap<String, ProcessingStats> {
        self.by_type.lock().clone()
    }

    pub(crate) fn reset(&self) {
        self.by_type.lock().clear();
    }
}
