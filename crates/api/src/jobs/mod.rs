//! Background job scheduler and job implementations.

mod reclaim;
mod scheduler;

pub use reclaim::ReclaimExpiredJob;
pub use scheduler::JobScheduler;
