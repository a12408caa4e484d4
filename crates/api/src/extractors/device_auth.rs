//! Device session extractor.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiError;
use crate::services::sessions::DeviceSession;

/// Authenticated device identity.
///
/// The device id comes from the verified session token, never from the
/// request path or body. Dispatch handlers take this extractor so a device
/// can only ever operate on its own queue.
#[derive(Debug, Clone, Copy)]
pub struct DeviceAuth {
    pub device_id: Uuid,
}

#[async_trait]
impl FromRequestParts<AppState> for DeviceAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // First, check if the session was already verified by middleware
        if let Some(session) = parts.extensions.get::<DeviceSession>() {
            return Ok(DeviceAuth {
                device_id: session.device_id,
            });
        }

        // Otherwise, verify the bearer token directly
        let auth_header = parts
            .headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("Missing Authorization header".to_string()))?;

        if !auth_header.starts_with("Bearer ") {
            return Err(ApiError::Unauthorized(
                "Invalid Authorization header format".to_string(),
            ));
        }

        let token = &auth_header[7..];

        match state.sessions.verify_device(token).await? {
            Some(session) => Ok(DeviceAuth {
                device_id: session.device_id,
            }),
            None => Err(ApiError::Unauthorized(
                "Invalid or expired session token".to_string(),
            )),
        }
    }
}
