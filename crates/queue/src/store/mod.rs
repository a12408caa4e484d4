//! Command store abstraction.
//!
//! The engine talks to the shared key-value store through [`CommandStore`]:
//! sorted sets for dispatch ordering, hashes for records and claims, sets
//! for membership, an atomic multi-operation [`CommandStore::apply`], and a
//! cursor-paged key scan. Two backends exist: [`memory::MemoryStore`] for
//! tests and single-node development, [`redis::RedisStore`] for production.

pub mod memory;
pub mod redis;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::StoreError;

/// One operation inside an atomic [`CommandStore::apply`] batch.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreOp {
    /// Insert or update a sorted-set member with the given score.
    ZAdd {
        key: String,
        member: String,
        score: i64,
    },
    /// Remove a sorted-set member.
    ZRem { key: String, member: String },
    /// Set hash fields.
    HSet {
        key: String,
        fields: Vec<(String, String)>,
    },
    /// Delete hash fields.
    HDel { key: String, fields: Vec<String> },
    /// Add a set member.
    SAdd { key: String, member: String },
    /// Remove a set member.
    SRem { key: String, member: String },
    /// Delete a whole key.
    Del { key: String },
}

/// Async interface to the shared key-value store.
///
/// Single-key reads and the two single-key writes the engine needs outside a
/// transaction are direct methods; every multi-key mutation goes through
/// [`CommandStore::apply`], which the backend executes atomically.
#[async_trait]
pub trait CommandStore: Send + Sync {
    /// Inserts or updates a sorted-set member.
    async fn zadd(&self, key: &str, member: &str, score: i64) -> Result<(), StoreError>;

    /// Atomically pops up to `count` members with the lowest scores.
    ///
    /// Returns `(member, score)` pairs in ascending score order. The pop is
    /// the exclusive hand-off of the claim path: a popped member exists only
    /// in the caller's memory until it is re-inserted or marked claimed.
    async fn zpop_min(&self, key: &str, count: u32) -> Result<Vec<(String, i64)>, StoreError>;

    /// Reads one hash field.
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError>;

    /// Reads all fields of a hash. A missing key yields an empty map.
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError>;

    /// Reads all members of a set. A missing key yields an empty vec.
    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError>;

    /// One page of a cursor-based key scan.
    ///
    /// Pass `cursor = 0` to start; a returned cursor of 0 means the scan is
    /// complete. `count` is a page-size hint, and pages may contain fewer
    /// (or slightly more) matches, exactly like the underlying store.
    async fn scan(
        &self,
        pattern: &str,
        cursor: u64,
        count: u32,
    ) -> Result<(u64, Vec<String>), StoreError>;

    /// Applies a batch of operations atomically.
    async fn apply(&self, ops: Vec<StoreOp>) -> Result<(), StoreError>;

    /// Round-trips to the store; used by health checks.
    async fn ping(&self) -> Result<(), StoreError>;
}
