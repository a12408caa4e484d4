//! Key-space layout on the shared store.
//!
//! All keys live under the `fleetq:` prefix:
//!
//! - `fleetq:command:{command_id}` (HASH): the command record
//! - `fleetq:pending:{device_id}` (ZSET): pending command IDs, scored by
//!   priority and enqueue time
//! - `fleetq:claims:{device_id}` (HASH): command ID -> `token|visible_until`
//!   for outstanding claims
//! - `fleetq:device:{device_id}:commands` (SET): every command ID tracked
//!   for the device, regardless of status

use uuid::Uuid;

/// Scan pattern matching every device's claims hash.
pub const CLAIMS_PATTERN: &str = "fleetq:claims:*";

/// Builds the key for a command record.
pub fn command_key(command_id: Uuid) -> String {
    format!("fleetq:command:{}", command_id)
}

/// Builds the key for a device's pending sorted set.
pub fn pending_key(device_id: Uuid) -> String {
    format!("fleetq:pending:{}", device_id)
}

/// Builds the key for a device's claims hash.
pub fn claims_key(device_id: Uuid) -> String {
    format!("fleetq:claims:{}", device_id)
}

/// Builds the key for a device's command membership set.
pub fn device_commands_key(device_id: Uuid) -> String {
    format!("fleetq:device:{}:commands", device_id)
}

/// Recovers the device ID from a claims key produced by [`claims_key`].
pub fn device_id_from_claims_key(key: &str) -> Option<Uuid> {
    key.strip_prefix("fleetq:claims:")
        .and_then(|rest| Uuid::parse_str(rest).ok())
}
