//! Command record codec.
//!
//! Commands are stored field-per-attribute in a hash. Timestamps are epoch
//! milliseconds, `parameters` and `result` are serialized JSON, and lease
//! fields are present only while they hold a value; an unclaimed command has
//! no `claim_token` or `visible_until` field at all.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use domain::models::{Command, CommandStatus};
use uuid::Uuid;

use crate::error::StoreError;

/// Multiplier applied to the priority when composing a dispatch score.
///
/// One scalar must order first by priority tier and then by enqueue time, so
/// the score is `priority * FACTOR + enqueue_millis`. The factor leaves 10^13
/// milliseconds (~317 years) of timestamp room per tier, and with priorities
/// capped at a single digit the largest score stays below 2^53, where the
/// store's float score representation is still exact.
pub const PRIORITY_SCORE_FACTOR: i64 = 10_000_000_000_000;

/// Hash field names of a command record.
pub mod fields {
    pub const ID: &str = "id";
    pub const DEVICE_ID: &str = "device_id";
    pub const CUSTOMER_ID: &str = "customer_id";
    pub const COMMAND_TYPE: &str = "command_type";
    pub const PARAMETERS: &str = "parameters";
    pub const PRIORITY: &str = "priority";
    pub const STATUS: &str = "status";
    pub const CREATED_AT: &str = "created_at";
    pub const CLAIM_TOKEN: &str = "claim_token";
    pub const CLAIMED_AT: &str = "claimed_at";
    pub const VISIBLE_UNTIL: &str = "visible_until";
    pub const COMPLETED_AT: &str = "completed_at";
    pub const RESULT: &str = "result";
}

/// Composes the pending sorted-set score for a command.
///
/// Lower priority values sort first; within a tier, earlier enqueue times
/// sort first.
pub fn dispatch_score(priority: i64, enqueued_at_millis: i64) -> i64 {
    priority * PRIORITY_SCORE_FACTOR + enqueued_at_millis
}

/// Encodes a command into record hash fields.
///
/// Optional fields are emitted only when set; [`decode_command`] relies on
/// absence meaning `None`.
pub fn encode_command(command: &Command) -> Vec<(String, String)> {
    let mut out = vec![
        (fields::ID.to_string(), command.id.to_string()),
        (fields::DEVICE_ID.to_string(), command.device_id.to_string()),
        (
            fields::CUSTOMER_ID.to_string(),
            command.customer_id.to_string(),
        ),
        (
            fields::COMMAND_TYPE.to_string(),
            command.command_type.clone(),
        ),
        (
            fields::PARAMETERS.to_string(),
            command.parameters.to_string(),
        ),
        (fields::PRIORITY.to_string(), command.priority.to_string()),
        (fields::STATUS.to_string(), command.status.to_string()),
        (
            fields::CREATED_AT.to_string(),
            command.created_at.timestamp_millis().to_string(),
        ),
    ];

    if let Some(token) = &command.claim_token {
        out.push((fields::CLAIM_TOKEN.to_string(), token.clone()));
    }
    if let Some(claimed_at) = command.claimed_at {
        out.push((
            fields::CLAIMED_AT.to_string(),
            claimed_at.timestamp_millis().to_string(),
        ));
    }
    if let Some(visible_until) = command.visible_until {
        out.push((
            fields::VISIBLE_UNTIL.to_string(),
            visible_until.timestamp_millis().to_string(),
        ));
    }
    if let Some(completed_at) = command.completed_at {
        out.push((
            fields::COMPLETED_AT.to_string(),
            completed_at.timestamp_millis().to_string(),
        ));
    }
    if let Some(result) = &command.result {
        out.push((fields::RESULT.to_string(), result.to_string()));
    }

    out
}

/// Decodes a record hash into a command.
///
/// A malformed record is an infrastructure error
/// ([`StoreError::Corrupt`]), never a domain condition.
pub fn decode_command(map: &HashMap<String, String>) -> Result<Command, StoreError> {
    Ok(Command {
        id: parse_uuid(map, fields::ID)?,
        device_id: parse_uuid(map, fields::DEVICE_ID)?,
        customer_id: parse_uuid(map, fields::CUSTOMER_ID)?,
        command_type: require(map, fields::COMMAND_TYPE)?.clone(),
        parameters: parse_json(map, fields::PARAMETERS)?,
        priority: parse_i64(map, fields::PRIORITY)?,
        status: parse_status(map)?,
        created_at: parse_millis(require(map, fields::CREATED_AT)?, fields::CREATED_AT)?,
        claim_token: map.get(fields::CLAIM_TOKEN).cloned(),
        claimed_at: parse_optional_millis(map, fields::CLAIMED_AT)?,
        visible_until: parse_optional_millis(map, fields::VISIBLE_UNTIL)?,
        completed_at: parse_optional_millis(map, fields::COMPLETED_AT)?,
        result: parse_optional_json(map, fields::RESULT)?,
    })
}

/// Encodes a claims-hash entry: `token|visible_until_millis`.
pub fn encode_claim_entry(claim_token: &str, visible_until_millis: i64) -> String {
    format!("{}|{}", claim_token, visible_until_millis)
}

/// Decodes a claims-hash entry into `(token, visible_until_millis)`.
pub fn decode_claim_entry(entry: &str) -> Result<(String, i64), StoreError> {
    let (token, visible) = entry
        .split_once('|')
        .ok_or_else(|| StoreError::Corrupt(format!("malformed claim entry: {}", entry)))?;
    if token.is_empty() {
        return Err(StoreError::Corrupt(format!(
            "claim entry has empty token: {}",
            entry
        )));
    }
    let visible_until_millis: i64 = visible
        .parse()
        .map_err(|_| StoreError::Corrupt(format!("malformed claim entry: {}", entry)))?;
    Ok((token.to_string(), visible_until_millis))
}

fn require<'a>(map: &'a HashMap<String, String>, field: &str) -> Result<&'a String, StoreError> {
    map.get(field)
        .ok_or_else(|| StoreError::Corrupt(format!("missing field: {}", field)))
}

fn parse_uuid(map: &HashMap<String, String>, field: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(require(map, field)?)
        .map_err(|_| StoreError::Corrupt(format!("invalid uuid in field: {}", field)))
}

fn parse_i64(map: &HashMap<String, String>, field: &str) -> Result<i64, StoreError> {
    require(map, field)?
        .parse()
        .map_err(|_| StoreError::Corrupt(format!("invalid integer in field: {}", field)))
}

fn parse_json(map: &HashMap<String, String>, field: &str) -> Result<serde_json::Value, StoreError> {
    serde_json::from_str(require(map, field)?)
        .map_err(|_| StoreError::Corrupt(format!("invalid json in field: {}", field)))
}

fn parse_optional_json(
    map: &HashMap<String, String>,
    field: &str,
) -> Result<Option<serde_json::Value>, StoreError> {
    match map.get(field) {
        Some(raw) => serde_json::from_str(raw)
            .map(Some)
            .map_err(|_| StoreError::Corrupt(format!("invalid json in field: {}", field))),
        None => Ok(None),
    }
}

fn parse_status(map: &HashMap<String, String>) -> Result<CommandStatus, StoreError> {
    CommandStatus::from_str(require(map, fields::STATUS)?).map_err(StoreError::Corrupt)
}

fn parse_millis(raw: &str, field: &str) -> Result<DateTime<Utc>, StoreError> {
    let millis: i64 = raw
        .parse()
        .map_err(|_| StoreError::Corrupt(format!("invalid timestamp in field: {}", field)))?;
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| StoreError::Corrupt(format!("invalid timestamp in field: {}", field)))
}

fn parse_optional_millis(
    map: &HashMap<String, String>,
    field: &str,
) -> Result<Option<DateTime<Utc>>, StoreError> {
    match map.get(field) {
        Some(raw) => parse_millis(raw, field).map(Some),
        None => Ok(None),
    }
}
