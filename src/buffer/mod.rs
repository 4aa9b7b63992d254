// Size-bounded snapshot window, drained into one Aggregate per flush interval.
// Owned by the scheduler task; it is not internally synchronized.

pub mod aggregation;

use crate::models::{Aggregate, Snapshot};
use chrono::Utc;
use std::time::Duration;
use tokio::time::Instant;

/// Default window cap (samples).
pub const DEFAULT_MAX_SIZE: usize = 1000;

pub struct MetricBuffer {
    snapshots: Vec<Snapshot>,
    max_size: usize,
    flush_interval: Duration,
    last_flush_time: Instant,
    dropped_total: u64,
    truncations: u64,
}

impl MetricBuffer {
    pub fn new(flush_interval: Duration, max_size: usize) -> Self {
        Self::with_start(flush_interval, max_size, Instant::now())
    }

    /// Buffer whose first flush window starts at `start`.
    pub fn with_start(flush_interval: Duration, max_size: usize, start: Instant) -> Self {
        Self {
            snapshots: Vec::new(),
            max_size: max_size.max(1),
            flush_interval,
            last_flush_time: start,
            dropped_total: 0,
            truncations: 0,
        }
    }

    /// Appends `snapshot`, stamping `collected_at` if missing. At the cap, the oldest
    /// half of the window is discarded first.
    pub fn add_snapshot(&mut self, mut snapshot: Snapshot) {
        if self.snapshots.len() >= self.max_size {
            let keep = self.max_size / 2;
            let drop = self.snapshots.len() - keep;
            self.snapshots.drain(..drop);
            self.dropped_total += drop as u64;
            self.truncations += 1;
            tracing::warn!(
                dropped = drop,
                kept = keep,
                max_size = self.max_size,
                "metric buffer full; discarded oldest samples"
            );
        }
        snapshot.collected_at.get_or_insert_with(Utc::now);
        self.snapshots.push(snapshot);
    }

    pub fn should_flush(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_flush_time) >= self.flush_interval
    }

    /// Destructive read: aggregates the window, clears it and restarts the flush clock.
    /// An empty buffer yields None and leaves the clock alone.
    pub fn drain_aggregate(&mut self, now: Instant) -> Option<Aggregate> {
        let aggregate = aggregation::aggregate_window(&self.snapshots, Utc::now())?;
        self.snapshots.clear();
        self.last_flush_time = now;
        Some(aggregate)
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn last_flush_time(&self) -> Instant {
        self.last_flush_time
    }

    pub fn flush_interval(&self) -> Duration {
        self.flush_interval
    }

    /// Time left until `should_flush` turns true (zero when already due).
    pub fn time_until_flush(&self, now: Instant) -> Duration {
        (self.last_flush_time + self.flush_interval).saturating_duration_since(now)
    }

    /// Samples discarded by cap enforcement since creation.
    pub fn dropped_total(&self) -> u64 {
        self.dropped_total
    }

    /// How many times the cap forced a truncation (one warning each).
    pub fn truncations(&self) -> u64 {
        self.truncations
    }
}
