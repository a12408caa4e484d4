//! Customer-facing command endpoints.
//!
//! Customers issue commands to their devices and inspect or retract them.
//! Every handler scopes by the customer id resolved from the session, so one
//! tenant can never see another tenant's commands; a foreign command id
//! answers 404 rather than 403 to avoid leaking its existence.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use domain::models::{
    Command, CommandListResponse, CommandPagination, CreateCommandRequest, DeviceCommandsQuery,
    DEFAULT_PRIORITY,
};
use shared::pagination::{decode_cursor, encode_cursor};

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::CustomerAuth;

/// Page size when a listing request does not name one.
const DEFAULT_LIST_LIMIT: usize = 50;

/// Create a command for a device.
///
/// `POST /api/admin/v1/devices/:device_id/commands`
#[axum::debug_handler]
pub async fn create_command(
    State(state): State<AppState>,
    Path(device_id): Path<Uuid>,
    customer: CustomerAuth,
    Json(request): Json<CreateCommandRequest>,
) -> Result<impl IntoResponse, ApiError> {
    request.validate()?;

    let priority = request.priority.unwrap_or(DEFAULT_PRIORITY);
    let command = state
        .queue
        .add_command(
            device_id,
            customer.customer_id,
            request.command_type,
            request.parameters,
            priority,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(command)))
}

/// List a device's commands, newest first, with cursor pagination.
///
/// `GET /api/admin/v1/devices/:device_id/commands`
#[axum::debug_handler]
pub async fn list_device_commands(
    State(state): State<AppState>,
    Path(device_id): Path<Uuid>,
    customer: CustomerAuth,
    Query(query): Query<DeviceCommandsQuery>,
) -> Result<Json<CommandListResponse>, ApiError> {
    query.validate()?;

    let limit = query.limit.map(|l| l as usize).unwrap_or(DEFAULT_LIST_LIMIT);
    let cursor = query.cursor.as_deref().map(decode_cursor).transpose()?;

    let commands: Vec<Command> = state
        .queue
        .get_device_commands(device_id)
        .await?
        .into_iter()
        .filter(|command| command.customer_id == customer.customer_id)
        .collect();

    let (commands, pagination) = page_after_cursor(commands, cursor, limit);

    Ok(Json(CommandListResponse {
        commands,
        pagination,
    }))
}

/// Fetch a single command.
///
/// `GET /api/admin/v1/commands/:command_id`
#[axum::debug_handler]
pub async fn get_command(
    State(state): State<AppState>,
    Path(command_id): Path<Uuid>,
    customer: CustomerAuth,
) -> Result<Json<Command>, ApiError> {
    let command = state
        .queue
        .get_command(command_id)
        .await?
        .filter(|command| command.customer_id == customer.customer_id)
        .ok_or_else(|| ApiError::NotFound("Command not found".to_string()))?;

    Ok(Json(command))
}

/// Delete a command in any state, retracting it from its device's queue.
///
/// `DELETE /api/admin/v1/commands/:command_id`
#[axum::debug_handler]
pub async fn delete_command(
    State(state): State<AppState>,
    Path(command_id): Path<Uuid>,
    customer: CustomerAuth,
) -> Result<StatusCode, ApiError> {
    // Ownership check first so a foreign id 404s without side effects.
    state
        .queue
        .get_command(command_id)
        .await?
        .filter(|command| command.customer_id == customer.customer_id)
        .ok_or_else(|| ApiError::NotFound("Command not found".to_string()))?;

    state.queue.delete_command(command_id).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Slices a newest-first listing at `cursor` and takes one page.
///
/// The listing is ordered by `(created_at, id)` descending; a cursor names
/// the last item of the previous page, so the next page is everything
/// strictly below it in that order.
fn page_after_cursor(
    mut commands: Vec<Command>,
    cursor: Option<(i64, Uuid)>,
    limit: usize,
) -> (Vec<Command>, CommandPagination) {
    if let Some((millis, id)) = cursor {
        commands.retain(|c| (c.created_at.timestamp_millis(), c.id) < (millis, id));
    }

    let has_more = commands.len() > limit;
    commands.truncate(limit);

    let next_cursor = if has_more {
        commands
            .last()
            .map(|c| encode_cursor(c.created_at.timestamp_millis(), c.id))
    } else {
        None
    };

    (
        commands,
        CommandPagination {
            next_cursor,
            has_more,
        },
    )
}
