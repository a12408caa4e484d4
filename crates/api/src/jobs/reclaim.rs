//! Expired-claim reclaim background job.

use tracing::info;

use queue::metrics::SweepTimer;
use queue::CommandQueue;

use super::scheduler::{Job, JobFrequency};

/// Background job that returns expired claims to their device queues.
///
/// A device that crashes or loses connectivity mid-command never submits a
/// result; its claim expires and this job makes the command claimable again.
pub struct ReclaimExpiredJob {
    queue: CommandQueue,
    interval_secs: u64,
}

impl ReclaimExpiredJob {
    /// Create a new reclaim job.
    ///
    /// # Arguments
    /// * `queue` - Command queue to sweep
    /// * `interval_secs` - Seconds between sweep passes
    pub fn new(queue: CommandQueue, interval_secs: u64) -> Self {
        Self {
            queue,
            interval_secs,
        }
    }
}

#[async_trait::async_trait]
impl Job for ReclaimExpiredJob {
    fn name(&self) -> &'static str {
        "reclaim_expired_commands"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Seconds(self.interval_secs)
    }

    async fn execute(&self) -> Result<(), String> {
        let timer = SweepTimer::start();

        let stats = self
            .queue
            .reclaim_expired()
            .await
            .map_err(|e| format!("Failed to reclaim expired claims: {}", e))?;

        timer.record();

        if stats.reclaimed > 0 || stats.orphans_removed > 0 {
            info!(
                reclaimed = stats.reclaimed,
                orphans_removed = stats.orphans_removed,
                "Returned expired claims to their queues"
            );
        }

        Ok(())
    }
}
