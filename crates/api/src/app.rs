use axum::{
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use queue::CommandQueue;

use crate::config::Config;
use crate::middleware::{
    metrics_handler, metrics_middleware, rate_limit_middleware, require_customer_session,
    require_device_session, trace_id, RateLimiterState,
};
use crate::routes::{commands, dispatch, health};
use crate::services::SessionVerifier;

#[derive(Clone)]
pub struct AppState {
    pub queue: CommandQueue,
    pub sessions: Arc<dyn SessionVerifier>,
    pub config: Arc<Config>,
    pub rate_limiter: Option<Arc<RateLimiterState>>,
}

pub fn create_app(
    config: Config,
    queue: CommandQueue,
    sessions: Arc<dyn SessionVerifier>,
) -> Router {
    let config = Arc::new(config);

    // Create rate limiter if rate limiting is enabled (device_rate_limit_per_minute > 0)
    let rate_limiter = if config.security.device_rate_limit_per_minute > 0 {
        Some(Arc::new(RateLimiterState::new(
            config.security.device_rate_limit_per_minute,
        )))
    } else {
        None
    };

    let state = AppState {
        queue,
        sessions,
        config: config.clone(),
        rate_limiter,
    };

    // Build CORS layer based on configuration
    let cors = if config.security.cors_origins.is_empty() {
        // Default: allow any origin (for development)
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        // Production: only allow specified origins
        use tower_http::cors::AllowOrigin;
        let origins: Vec<_> = config
            .security
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    // Device routes (require a device session token)
    // Middleware order: session auth runs first, then per-device rate limiting
    // (which needs the device id from the session)
    let device_routes = Router::new()
        .route("/api/v1/commands/claim", post(dispatch::claim_commands))
        .route(
            "/api/v1/commands/:command_id/extend",
            post(dispatch::extend_visibility),
        )
        .route(
            "/api/v1/commands/:command_id/result",
            post(dispatch::submit_result),
        )
        // Rate limiting runs after auth (needs the device id from the session)
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        // Auth runs first (outermost layer = runs first)
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_device_session,
        ));

    // Customer routes (require a customer session token)
    let customer_routes = Router::new()
        .route(
            "/api/admin/v1/devices/:device_id/commands",
            post(commands::create_command).get(commands::list_device_commands),
        )
        .route(
            "/api/admin/v1/commands/:command_id",
            get(commands::get_command).delete(commands::delete_command),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_customer_session,
        ));

    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/api/health", get(health::health_check))
        .route("/api/health/ready", get(health::ready))
        .route("/api/health/live", get(health::live))
        .route("/metrics", get(metrics_handler));

    // Merge all routes
    Router::new()
        .merge(public_routes)
        .merge(device_routes)
        .merge(customer_routes)
        .fallback(not_found)
        // Global middleware (order matters: bottom layers run first)
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .layer(middleware::from_fn(metrics_middleware)) // Prometheus metrics
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_id)) // Request ID and logging
        .layer(cors)
        .with_state(state)
}

/// JSON 404 for unmatched paths, matching the error body shape used elsewhere.
async fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({
            "error": "not_found",
            "message": "Resource not found"
        })),
    )
}
