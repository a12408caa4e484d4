//! Device-facing dispatch endpoints.
//!
//! Devices poll for work, keep their leases alive, and report results. The
//! device id is always the one resolved from the session token; a device
//! cannot name a different device in a request.

use std::time::Duration;

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use domain::models::{
    ClaimCommandsRequest, ClaimCommandsResponse, ExtendVisibilityRequest, ExtendVisibilityResponse,
    SubmitResultRequest, SubmitResultResponse,
};

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::DeviceAuth;

/// Claim the device's next commands under a visibility lease.
///
/// `POST /api/v1/commands/claim`
#[axum::debug_handler]
pub async fn claim_commands(
    State(state): State<AppState>,
    device: DeviceAuth,
    Json(request): Json<ClaimCommandsRequest>,
) -> Result<Json<ClaimCommandsResponse>, ApiError> {
    request.validate()?;

    let limit = effective_limit(
        request.limit,
        state.config.queue.default_claim_limit,
        state.config.queue.max_claim_limit,
    );
    let visibility_timeout = request
        .visibility_timeout_ms
        .map(|ms| Duration::from_millis(ms as u64));

    let commands = state
        .queue
        .claim_commands(device.device_id, Some(limit), visibility_timeout)
        .await?;

    Ok(Json(ClaimCommandsResponse { commands }))
}

/// Extend the visibility lease on a claimed command.
///
/// `POST /api/v1/commands/:command_id/extend`
#[axum::debug_handler]
pub async fn extend_visibility(
    State(state): State<AppState>,
    Path(command_id): Path<Uuid>,
    device: DeviceAuth,
    Json(request): Json<ExtendVisibilityRequest>,
) -> Result<Json<ExtendVisibilityResponse>, ApiError> {
    request.validate()?;

    let visibility_timeout = request
        .visibility_timeout_ms
        .map(|ms| Duration::from_millis(ms as u64));

    let visible_until = state
        .queue
        .extend_visibility(
            device.device_id,
            command_id,
            &request.claim_token,
            visibility_timeout,
        )
        .await?;

    Ok(Json(ExtendVisibilityResponse {
        command_id,
        visible_until,
    }))
}

/// Submit the execution result for a claimed command, completing it.
///
/// `POST /api/v1/commands/:command_id/result`
#[axum::debug_handler]
pub async fn submit_result(
    State(state): State<AppState>,
    Path(command_id): Path<Uuid>,
    device: DeviceAuth,
    Json(request): Json<SubmitResultRequest>,
) -> Result<Json<SubmitResultResponse>, ApiError> {
    request.validate()?;

    let command = state
        .queue
        .submit_result(
            device.device_id,
            command_id,
            &request.claim_token,
            request.result,
        )
        .await?;

    Ok(Json(SubmitResultResponse {
        command_id: command.id,
        status: command.status,
        completed_at: command.completed_at.unwrap_or_else(Utc::now),
    }))
}

/// Caps a requested claim batch size by the configured limits.
fn effective_limit(requested: Option<u32>, default: u32, max: u32) -> u32 {
    requested.unwrap_or(default).min(max)
}
