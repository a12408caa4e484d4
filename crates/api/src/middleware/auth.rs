//! Session authentication middleware.
//!
//! Device and customer route groups run behind these middlewares. The
//! verified session lands in request extensions; handlers take the device or
//! customer identity from there and never from the request itself.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::app::AppState;
use crate::error::ApiError;

/// Extracts the bearer token from the Authorization header.
pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let auth_header = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    if !auth_header.starts_with("Bearer ") {
        return None;
    }
    Some(&auth_header[7..])
}

/// Middleware that requires a valid device session token.
///
/// The resolved [`DeviceSession`](crate::services::sessions::DeviceSession)
/// is stored in request extensions for downstream handlers.
pub async fn require_device_session(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let token = match bearer_token(req.headers()) {
        Some(token) => token.to_string(),
        None => {
            return ApiError::Unauthorized("Missing bearer token".to_string()).into_response();
        }
    };

    match state.sessions.verify_device(&token).await {
        Ok(Some(session)) => {
            req.extensions_mut().insert(session);
            next.run(req).await
        }
        Ok(None) => {
            ApiError::Unauthorized("Invalid or expired session token".to_string()).into_response()
        }
        Err(err) => ApiError::from(err).into_response(),
    }
}

/// Middleware that requires a valid customer session token.
///
/// The resolved [`CustomerSession`](crate::services::sessions::CustomerSession)
/// is stored in request extensions for downstream handlers.
pub async fn require_customer_session(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let token = match bearer_token(req.headers()) {
        Some(token) => token.to_string(),
        None => {
            return ApiError::Unauthorized("Missing bearer token".to_string()).into_response();
        }
    };

    match state.sessions.verify_customer(&token).await {
        Ok(Some(session)) => {
            req.extensions_mut().insert(session);
            next.run(req).await
        }
        Ok(None) => {
            ApiError::Unauthorized("Invalid or expired session token".to_string()).into_response()
        }
        Err(err) => ApiError::from(err).into_response(),
    }
}
