//! Redis-backed command store.
//!
//! All trait methods clone the shared [`ConnectionManager`], which multiplexes
//! over one reconnect-on-failure connection. Batches run as MULTI/EXEC
//! pipelines so a claim or completion either lands in full or not at all.

use std::collections::HashMap;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::{CommandStore, StoreOp};
use crate::error::StoreError;

#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connects to Redis and waits for the initial handshake.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(map_redis_error)?;
        let conn = ConnectionManager::new(client).await.map_err(map_redis_error)?;
        Ok(Self { conn })
    }
}

fn map_redis_error(err: redis::RedisError) -> StoreError {
    if err.is_io_error()
        || err.is_connection_refusal()
        || err.is_connection_dropped()
        || err.is_timeout()
    {
        StoreError::Connection(err.to_string())
    } else {
        StoreError::Backend(err.to_string())
    }
}

fn map_transaction_error(err: redis::RedisError) -> StoreError {
    match map_redis_error(err) {
        StoreError::Connection(message) => StoreError::Connection(message),
        other => StoreError::Transaction(other.to_string()),
    }
}

#[async_trait]
impl CommandStore for RedisStore {
    async fn zadd(&self, key: &str, member: &str, score: i64) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.zadd(key, member, score).await.map_err(map_redis_error)?;
        Ok(())
    }

    async fn zpop_min(&self, key: &str, count: u32) -> Result<Vec<(String, i64)>, StoreError> {
        let mut conn = self.conn.clone();
        let popped: Vec<(String, f64)> = conn
            .zpopmin(key, count as isize)
            .await
            .map_err(map_redis_error)?;
        // Scores stay well below 2^53, so the f64 round-trip is exact.
        Ok(popped
            .into_iter()
            .map(|(member, score)| (member, score as i64))
            .collect())
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        conn.hget(key, field).await.map_err(map_redis_error)
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        let mut conn = self.conn.clone();
        conn.hgetall(key).await.map_err(map_redis_error)
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        conn.smembers(key).await.map_err(map_redis_error)
    }

    async fn scan(
        &self,
        pattern: &str,
        cursor: u64,
        count: u32,
    ) -> Result<(u64, Vec<String>), StoreError> {
        let mut conn = self.conn.clone();
        let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok((next_cursor, keys))
    }

    async fn apply(&self, ops: Vec<StoreOp>) -> Result<(), StoreError> {
        if ops.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for op in &ops {
            match op {
                StoreOp::ZAdd { key, member, score } => {
                    pipe.zadd(key, member, *score).ignore();
                }
                StoreOp::ZRem { key, member } => {
                    pipe.zrem(key, member).ignore();
                }
                StoreOp::HSet { key, fields } => {
                    pipe.hset_multiple(key, fields).ignore();
                }
                StoreOp::HDel { key, fields } => {
                    pipe.hdel(key, fields.clone()).ignore();
                }
                StoreOp::SAdd { key, member } => {
                    pipe.sadd(key, member).ignore();
                }
                StoreOp::SRem { key, member } => {
                    pipe.srem(key, member).ignore();
                }
                StoreOp::Del { key } => {
                    pipe.del(key).ignore();
                }
            }
        }

        let mut conn = self.conn.clone();
        pipe.query_async::<_, ()>(&mut conn)
            .await
            .map_err(map_transaction_error)?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(())
    }
}
