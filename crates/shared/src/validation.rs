//! Common validation utilities.

use validator::ValidationError;

/// Maximum length of a command type identifier.
const MAX_COMMAND_TYPE_LEN: usize = 128;

/// Maximum accepted priority value. Priorities beyond this would start to
/// crowd the timestamp component of the composite dispatch score.
pub const MAX_PRIORITY: i64 = 9;

/// Bounds on a caller-supplied visibility timeout, in milliseconds.
pub const MIN_VISIBILITY_TIMEOUT_MS: i64 = 1_000;
pub const MAX_VISIBILITY_TIMEOUT_MS: i64 = 24 * 60 * 60 * 1_000;

lazy_static::lazy_static! {
    static ref COMMAND_TYPE_REGEX: regex::Regex =
        regex::Regex::new(r"^[a-zA-Z][a-zA-Z0-9_.\-]*$").unwrap();
}

/// Validates a command type identifier (e.g. `reboot`, `config.update`).
pub fn validate_command_type(command_type: &str) -> Result<(), ValidationError> {
    if command_type.is_empty() || command_type.len() > MAX_COMMAND_TYPE_LEN {
        let mut err = ValidationError::new("command_type_length");
        err.message = Some("Command type must be 1-128 characters".into());
        return Err(err);
    }
    if !COMMAND_TYPE_REGEX.is_match(command_type) {
        let mut err = ValidationError::new("command_type_charset");
        err.message =
            Some("Command type must start with a letter and contain only [a-zA-Z0-9_.-]".into());
        return Err(err);
    }
    Ok(())
}

/// Validates that a priority is within the dispatchable range (0 to 9).
pub fn validate_priority(priority: i64) -> Result<(), ValidationError> {
    if (0..=MAX_PRIORITY).contains(&priority) {
        Ok(())
    } else {
        let mut err = ValidationError::new("priority_range");
        err.message = Some("Priority must be between 0 and 9".into());
        Err(err)
    }
}

/// Validates a caller-supplied visibility timeout in milliseconds.
///
/// The lower bound rejects timeouts that would expire before the response
/// reaches the device; the upper bound caps how long a crashed device can
/// keep a command invisible.
pub fn validate_visibility_timeout(timeout_ms: i64) -> Result<(), ValidationError> {
    if (MIN_VISIBILITY_TIMEOUT_MS..=MAX_VISIBILITY_TIMEOUT_MS).contains(&timeout_ms) {
        Ok(())
    } else {
        let mut err = ValidationError::new("visibility_timeout_range");
        err.message = Some("Visibility timeout must be between 1 second and 24 hours".into());
        Err(err)
    }
}
