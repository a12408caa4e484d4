//! Command domain models and API types.
//!
//! A command is a unit of work issued to a single device. It moves through a
//! small lifecycle: created as `pending`, handed out as `claimed` under a
//! visibility lease, and finished as `completed`. An expired lease sends the
//! command back to `pending`; `completed` is terminal and immutable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Priority used when a request does not supply one. The dispatch order
/// places lower values first, so 5 sits in the middle of the 0-9 range.
pub const DEFAULT_PRIORITY: i64 = 5;

// ============================================================================
// Command Status
// ============================================================================

/// Lifecycle state of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Pending,
    Claimed,
    Completed,
}

impl CommandStatus {
    /// Returns the string representation used in the store.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Claimed => "claimed",
            Self::Completed => "completed",
        }
    }

    /// Whether the lifecycle permits moving from `self` to `next`.
    ///
    /// `claimed -> pending` is the lease-expiry path; there is no way out of
    /// `completed`.
    pub fn can_transition_to(&self, next: CommandStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Claimed)
                | (Self::Claimed, Self::Completed)
                | (Self::Claimed, Self::Pending)
        )
    }

    /// Whether this state admits no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl std::fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for CommandStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "claimed" => Ok(Self::Claimed),
            "completed" => Ok(Self::Completed),
            _ => Err(format!("Invalid command status: {}", s)),
        }
    }
}

// ============================================================================
// Command
// ============================================================================

/// Command domain model.
///
/// The claim token never appears in serialized output; it is only handed to
/// the device that claimed the command, inside [`ClaimedCommand`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Command {
    pub id: Uuid,
    pub device_id: Uuid,
    pub customer_id: Uuid,
    pub command_type: String,
    pub parameters: serde_json::Value,
    pub priority: i64,
    pub status: CommandStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing, default)]
    pub claim_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub claimed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub visible_until: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub result: Option<serde_json::Value>,
}

impl Command {
    /// Creates a new pending command with a fresh ID and creation timestamp.
    pub fn new(
        device_id: Uuid,
        customer_id: Uuid,
        command_type: String,
        parameters: serde_json::Value,
        priority: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            device_id,
            customer_id,
            command_type,
            parameters,
            priority,
            status: CommandStatus::Pending,
            created_at: Utc::now(),
            claim_token: None,
            claimed_at: None,
            visible_until: None,
            completed_at: None,
            result: None,
        }
    }
}

/// A command as handed to the device that claimed it.
///
/// Carries the claim token the device must present to extend the lease or
/// submit its result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ClaimedCommand {
    pub id: Uuid,
    pub command_type: String,
    pub parameters: serde_json::Value,
    pub priority: i64,
    pub created_at: DateTime<Utc>,
    pub claim_token: String,
    pub visible_until: DateTime<Utc>,
}

// ============================================================================
// Requests
// ============================================================================

/// Request to issue a command to a device.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct CreateCommandRequest {
    #[validate(custom(function = "shared::validation::validate_command_type"))]
    pub command_type: String,
    /// Opaque payload interpreted by the device agent.
    #[serde(default = "default_parameters")]
    pub parameters: serde_json::Value,
    /// Lower values dispatch first. Defaults to [`DEFAULT_PRIORITY`].
    #[validate(custom(function = "validate_optional_priority"))]
    pub priority: Option<i64>,
}

/// Request body for a device claiming its next commands.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct ClaimCommandsRequest {
    /// Maximum number of commands to claim in this call.
    #[validate(range(min = 1, max = 100, message = "Limit must be between 1 and 100"))]
    pub limit: Option<u32>,
    /// Requested lease duration; server default applies when omitted.
    #[validate(custom(function = "validate_optional_visibility_timeout"))]
    pub visibility_timeout_ms: Option<i64>,
}

/// Request to extend the visibility lease on a claimed command.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct ExtendVisibilityRequest {
    #[validate(length(min = 1, max = 128, message = "Claim token is required"))]
    pub claim_token: String,
    #[validate(custom(function = "validate_optional_visibility_timeout"))]
    pub visibility_timeout_ms: Option<i64>,
}

/// Request to submit the execution result of a claimed command.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct SubmitResultRequest {
    #[validate(length(min = 1, max = 128, message = "Claim token is required"))]
    pub claim_token: String,
    /// Opaque outcome payload; execution failures are reported here too.
    #[serde(default)]
    pub result: serde_json::Value,
}

/// Query parameters for listing a device's commands.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "snake_case")]
pub struct DeviceCommandsQuery {
    #[validate(range(min = 1, max = 100, message = "Limit must be between 1 and 100"))]
    pub limit: Option<u32>,
    #[validate(length(max = 512))]
    pub cursor: Option<String>,
}

// ============================================================================
// Responses
// ============================================================================

/// Pagination info in a command listing response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CommandPagination {
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

/// Response for listing a device's commands.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct CommandListResponse {
    pub commands: Vec<Command>,
    pub pagination: CommandPagination,
}

/// Response for a claim call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ClaimCommandsResponse {
    pub commands: Vec<ClaimedCommand>,
}

/// Response for a successful lease extension.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ExtendVisibilityResponse {
    pub command_id: Uuid,
    pub visible_until: DateTime<Utc>,
}

/// Response for a successful result submission.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct SubmitResultResponse {
    pub command_id: Uuid,
    pub status: CommandStatus,
    pub completed_at: DateTime<Utc>,
}

fn default_parameters() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// Validates optional priority.
pub fn validate_optional_priority(priority: i64) -> Result<(), validator::ValidationError> {
    shared::validation::validate_priority(priority)
}

/// Validates optional visibility timeout.
pub fn validate_optional_visibility_timeout(
    timeout_ms: i64,
) -> Result<(), validator::ValidationError> {
    shared::validation::validate_visibility_timeout(timeout_ms)
}
