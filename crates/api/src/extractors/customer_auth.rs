//! Customer session extractor.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiError;
use crate::services::sessions::CustomerSession;

/// Authenticated customer identity for the admin command surface.
#[derive(Debug, Clone, Copy)]
pub struct CustomerAuth {
    pub customer_id: Uuid,
}

#[async_trait]
impl FromRequestParts<AppState> for CustomerAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // First, check if the session was already verified by middleware
        if let Some(session) = parts.extensions.get::<CustomerSession>() {
            return Ok(CustomerAuth {
                customer_id: session.customer_id,
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

        match state.sessions.verify_customer(token).await? {
            Some(session) => Ok(CustomerAuth {
                customer_id: session.customer_id,
            }),
            None => Err(ApiError::Unauthorized(
                "Invalid or expired session token".to_string(),
            )),
        }
    }
}
