//! In-memory command store.
//!
//! A single-process backend with the same observable semantics as the Redis
//! backend: typed values per key, atomic batches under one lock, empty
//! collections vanish, and a missing key reads as an empty collection. Used
//! by the test suites and by single-node development deployments.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{CommandStore, StoreOp};
use crate::error::StoreError;

#[derive(Debug, Clone)]
enum Value {
    Sorted(BTreeMap<String, i64>),
    Hash(HashMap<String, String>),
    Set(BTreeSet<String>),
}

/// Mutex-guarded in-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys; test helper.
    pub async fn key_count(&self) -> usize {
        self.data.lock().await.len()
    }
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::Backend(format!("wrong value type at key: {}", key))
}

fn sorted_mut<'a>(
    data: &'a mut BTreeMap<String, Value>,
    key: &str,
) -> Result<&'a mut BTreeMap<String, i64>, StoreError> {
    match data
        .entry(key.to_string())
        .or_insert_with(|| Value::Sorted(BTreeMap::new()))
    {
        Value::Sorted(members) => Ok(members),
        _ => Err(wrong_type(key)),
    }
}

fn hash_mut<'a>(
    data: &'a mut BTreeMap<String, Value>,
    key: &str,
) -> Result<&'a mut HashMap<String, String>, StoreError> {
    match data
        .entry(key.to_string())
        .or_insert_with(|| Value::Hash(HashMap::new()))
    {
        Value::Hash(fields) => Ok(fields),
        _ => Err(wrong_type(key)),
    }
}

fn set_mut<'a>(
    data: &'a mut BTreeMap<String, Value>,
    key: &str,
) -> Result<&'a mut BTreeSet<String>, StoreError> {
    match data
        .entry(key.to_string())
        .or_insert_with(|| Value::Set(BTreeSet::new()))
    {
        Value::Set(members) => Ok(members),
        _ => Err(wrong_type(key)),
    }
}

/// Removes a key whose collection became empty, mirroring Redis.
fn drop_if_empty(data: &mut BTreeMap<String, Value>, key: &str) {
    let is_empty = match data.get(key) {
        Some(Value::Sorted(m)) => m.is_empty(),
        Some(Value::Hash(m)) => m.is_empty(),
        Some(Value::Set(m)) => m.is_empty(),
        None => false,
    };
    if is_empty {
        data.remove(key);
    }
}

/// Matches keys against a pattern supporting `*` wildcards.
fn key_matches(pattern: &str, key: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == key;
    }

    let mut rest = key;
    let last = parts.len() - 1;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            match rest.strip_prefix(part) {
                Some(stripped) => rest = stripped,
                None => return false,
            }
        } else if i == last {
            match rest.strip_suffix(part) {
                Some(stripped) => rest = stripped,
                None => return false,
            }
        } else {
            match rest.find(part) {
                Some(pos) => rest = &rest[pos + part.len()..],
                None => return false,
            }
        }
    }
    true
}

fn apply_op(data: &mut BTreeMap<String, Value>, op: StoreOp) -> Result<(), StoreError> {
    match op {
        StoreOp::ZAdd { key, member, score } => {
            sorted_mut(data, &key)?.insert(member, score);
        }
        StoreOp::ZRem { key, member } => {
            if let Some(value) = data.get_mut(&key) {
                match value {
                    Value::Sorted(members) => {
                        members.remove(&member);
                    }
                    _ => return Err(wrong_type(&key)),
                }
                drop_if_empty(data, &key);
            }
        }
        StoreOp::HSet { key, fields } => {
            let hash = hash_mut(data, &key)?;
            for (field, value) in fields {
                hash.insert(field, value);
            }
        }
        StoreOp::HDel { key, fields } => {
            if let Some(value) = data.get_mut(&key) {
                match value {
                    Value::Hash(hash) => {
                        for field in &fields {
                            hash.remove(field);
                        }
                    }
                    _ => return Err(wrong_type(&key)),
                }
                drop_if_empty(data, &key);
            }
        }
        StoreOp::SAdd { key, member } => {
            set_mut(data, &key)?.insert(member);
        }
        StoreOp::SRem { key, member } => {
            if let Some(value) = data.get_mut(&key) {
                match value {
                    Value::Set(members) => {
                        members.remove(&member);
                    }
                    _ => return Err(wrong_type(&key)),
                }
                drop_if_empty(data, &key);
            }
        }
        StoreOp::Del { key } => {
            data.remove(&key);
        }
    }
    Ok(())
}

#[async_trait]
impl CommandStore for MemoryStore {
    async fn zadd(&self, key: &str, member: &str, score: i64) -> Result<(), StoreError> {
        let mut data = self.data.lock().await;
        sorted_mut(&mut data, key)?.insert(member.to_string(), score);
        Ok(())
    }

    async fn zpop_min(&self, key: &str, count: u32) -> Result<Vec<(String, i64)>, StoreError> {
        let mut data = self.data.lock().await;
        let members = match data.get_mut(key) {
            Some(Value::Sorted(members)) => members,
            Some(_) => return Err(wrong_type(key)),
            None => return Ok(Vec::new()),
        };

        let mut pairs: Vec<(String, i64)> = members
            .iter()
            .map(|(member, score)| (member.clone(), *score))
            .collect();
        pairs.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        pairs.truncate(count as usize);

        for (member, _) in &pairs {
            members.remove(member);
        }
        drop_if_empty(&mut data, key);
        Ok(pairs)
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        let data = self.data.lock().await;
        match data.get(key) {
            Some(Value::Hash(hash)) => Ok(hash.get(field).cloned()),
            Some(_) => Err(wrong_type(key)),
            None => Ok(None),
        }
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        let data = self.data.lock().await;
        match data.get(key) {
            Some(Value::Hash(hash)) => Ok(hash.clone()),
            Some(_) => Err(wrong_type(key)),
            None => Ok(HashMap::new()),
        }
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let data = self.data.lock().await;
        match data.get(key) {
            Some(Value::Set(members)) => Ok(members.iter().cloned().collect()),
            Some(_) => Err(wrong_type(key)),
            None => Ok(Vec::new()),
        }
    }

    async fn scan(
        &self,
        pattern: &str,
        cursor: u64,
        count: u32,
    ) -> Result<(u64, Vec<String>), StoreError> {
        let data = self.data.lock().await;
        let keys: Vec<&String> = data.keys().collect();
        let start = cursor as usize;
        if start >= keys.len() {
            return Ok((0, Vec::new()));
        }

        let end = (start + count.max(1) as usize).min(keys.len());
        let page: Vec<String> = keys[start..end]
            .iter()
            .filter(|key| key_matches(pattern, key))
            .map(|key| key.to_string())
            .collect();

        let next_cursor = if end >= keys.len() { 0 } else { end as u64 };
        Ok((next_cursor, page))
    }

    async fn apply(&self, ops: Vec<StoreOp>) -> Result<(), StoreError> {
        let mut data = self.data.lock().await;
        for op in ops {
            apply_op(&mut data, op)?;
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
