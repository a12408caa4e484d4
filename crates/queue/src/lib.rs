//! Command queue core for the FleetQ backend.
//!
//! This crate contains:
//! - The [`CommandStore`] trait over the shared key-value store, with
//!   in-memory and Redis backends
//! - Key-space builders and the command record codec
//! - The [`CommandQueue`] engine implementing enqueue, lease-based claiming,
//!   lease extension, result submission, expiry reclaim, and lookup/delete

pub mod engine;
pub mod error;
pub mod keys;
pub mod metrics;
pub mod record;
pub mod store;

pub use engine::{CommandQueue, QueueConfig, ReclaimStats};
pub use error::{QueueError, StoreError};
pub use store::memory::MemoryStore;
pub use store::redis::RedisStore;
pub use store::{CommandStore, StoreOp};
