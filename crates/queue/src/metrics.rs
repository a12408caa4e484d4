//! Queue metrics collection.
//!
//! Provides functions for recording queue-related metrics.

use metrics::{counter, histogram};
use std::time::Instant;

/// Record a command accepted into a device queue.
pub fn record_command_enqueued() {
    counter!("queue_commands_enqueued_total").increment(1);
}

/// Record commands handed to a device in one claim call.
pub fn record_commands_claimed(count: u64) {
    counter!("queue_commands_claimed_total").increment(count);
}

/// Record a popped command put back because its claim could not be written.
pub fn record_claim_requeued() {
    counter!("queue_claims_requeued_total").increment(1);
}

/// Record a command completed with a result.
pub fn record_command_completed() {
    counter!("queue_commands_completed_total").increment(1);
}

/// Record a command removed by an operator.
pub fn record_command_deleted() {
    counter!("queue_commands_deleted_total").increment(1);
}

/// Record expired claims returned to their queues by the sweeper.
pub fn record_commands_reclaimed(count: u64) {
    counter!("queue_commands_reclaimed_total").increment(count);
}

/// Record claim entries dropped because their command no longer needs them.
pub fn record_claim_orphans_removed(count: u64) {
    counter!("queue_claim_orphans_removed_total").increment(count);
}

/// Record sweep duration.
pub fn record_sweep_duration(duration_secs: f64) {
    histogram!("queue_sweep_duration_seconds").record(duration_secs);
}

/// A helper to time a sweep pass and record its duration.
///
/// Usage:
/// ```ignore
/// let timer = SweepTimer::start();
/// let stats = queue.reclaim_expired().await;
/// timer.record();
/// ```
pub struct SweepTimer {
    start: Instant,
}

impl SweepTimer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Record the elapsed duration to metrics.
    pub fn record(self) {
        record_sweep_duration(self.start.elapsed().as_secs_f64());
    }
}
