//! Per-device rate limiting middleware.
//!
//! Devices poll for work; a misbehaving agent can hammer the claim endpoint
//! hard enough to starve the store. Each device gets its own direct rate
//! limiter, keyed by the device id from the verified session.

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovRateLimiter,
};
use std::{
    collections::HashMap,
    num::NonZeroU32,
    sync::{Arc, RwLock},
};
use tracing::warn;
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiError;
use crate::services::sessions::DeviceSession;

/// Type alias for the rate limiter used per device.
type DeviceRateLimiter = GovRateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Rate limiter state shared across all requests, one limiter per device id.
pub struct RateLimiterState {
    limiters: RwLock<HashMap<Uuid, Arc<DeviceRateLimiter>>>,
    rate_limit_per_minute: u32,
}

impl RateLimiterState {
    pub fn new(rate_limit_per_minute: u32) -> Self {
        Self {
            limiters: RwLock::new(HashMap::new()),
            rate_limit_per_minute,
        }
    }

    /// Get or create a rate limiter for the given device.
    fn get_or_create_limiter(&self, device_id: Uuid) -> Arc<DeviceRateLimiter> {
        {
            let limiters = self.limiters.read().unwrap();
            if let Some(limiter) = limiters.get(&device_id) {
                return limiter.clone();
            }
        }

        let mut limiters = self.limiters.write().unwrap();

        // Double-check in case another thread created it
        if let Some(limiter) = limiters.get(&device_id) {
            return limiter.clone();
        }

        let quota = Quota::per_minute(
            NonZeroU32::new(self.rate_limit_per_minute).unwrap_or(NonZeroU32::MIN),
        );
        let limiter = Arc::new(GovRateLimiter::direct(quota));
        limiters.insert(device_id, limiter.clone());
        limiter
    }

    /// Check whether a request from the given device should be allowed.
    /// Returns Ok(()) if allowed, or Err with retry-after seconds.
    pub fn check(&self, device_id: Uuid) -> Result<(), u64> {
        let limiter = self.get_or_create_limiter(device_id);

        match limiter.check() {
            Ok(_) => Ok(()),
            Err(not_until) => {
                let wait_time = not_until.wait_time_from(governor::clock::Clock::now(
                    &governor::clock::DefaultClock::default(),
                ));
                Err(wait_time.as_secs().max(1))
            }
        }
    }
}

impl std::fmt::Debug for RateLimiterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiterState")
            .field("rate_limit_per_minute", &self.rate_limit_per_minute)
            .field("active_limiters", &self.limiters.read().unwrap().len())
            .finish()
    }
}

/// Middleware that applies rate limiting per device.
///
/// Must run AFTER session authentication so the device id is available in
/// request extensions; requests without one pass through (and fail auth).
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(rate_limiter) = &state.rate_limiter else {
        return next.run(req).await;
    };

    let device_id = match req.extensions().get::<DeviceSession>() {
        Some(session) => session.device_id,
        None => return next.run(req).await,
    };

    if let Err(retry_after_secs) = rate_limiter.check(device_id) {
        warn!(device_id = %device_id, retry_after_secs, "device rate limited");
        return ApiError::RateLimited { retry_after_secs }.into_response();
    }

    next.run(req).await
}
