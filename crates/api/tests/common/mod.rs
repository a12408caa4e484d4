//! Common test utilities for integration tests.
//!
//! Tests run against an in-memory command store, so no external services are
//! required. Each context gets its own store and its own token table.

// Allow dead code in this module - these are helper utilities that may not be used
// by all integration tests but are intentionally available for future use.
#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use uuid::Uuid;

use fleetq_api::{
    app::create_app,
    config::{
        Config, LoggingConfig, QueueSettings, SecurityConfig, ServerConfig, SessionsConfig,
        StoreConfig,
    },
    services::StaticSessionVerifier,
};
use queue::{CommandQueue, MemoryStore};

/// Bearer token the test device authenticates with.
pub const DEVICE_TOKEN: &str = "test-device-token";
/// Bearer token the primary test customer authenticates with.
pub const CUSTOMER_TOKEN: &str = "test-customer-token";
/// Bearer token for a second, unrelated customer.
pub const OTHER_CUSTOMER_TOKEN: &str = "test-other-customer-token";

/// A fully wired application over an in-memory store.
pub struct TestContext {
    pub app: Router,
    pub queue: CommandQueue,
    pub device_id: Uuid,
    pub customer_id: Uuid,
    pub other_customer_id: Uuid,
}

/// Test configuration: memory store, static sessions, rate limiting disabled.
pub fn test_config() -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0, // Use random port
            request_timeout_secs: 30,
        },
        store: StoreConfig {
            backend: "memory".to_string(),
            redis_url: String::new(),
        },
        queue: QueueSettings {
            default_visibility_timeout_secs: 300,
            default_claim_limit: 1,
            max_claim_limit: 100,
            sweep_interval_secs: 10,
            sweep_page_size: 100,
        },
        sessions: SessionsConfig {
            mode: "static".to_string(),
            url: String::new(),
            timeout_ms: 5000,
            device_tokens: vec![],
            customer_tokens: vec![],
        },
        security: SecurityConfig {
            cors_origins: vec![],
            device_rate_limit_per_minute: 0, // Disable rate limiting for tests
        },
        logging: LoggingConfig {
            level: "debug".to_string(),
            format: "pretty".to_string(),
        },
    }
}

/// Create a test context with the default test configuration.
pub fn test_context() -> TestContext {
    test_context_with_config(test_config())
}

/// Create a test context with a custom configuration.
///
/// The session verifier is injected directly, so the tokens in the config's
/// `sessions` section are not consulted.
pub fn test_context_with_config(config: Config) -> TestContext {
    let device_id = Uuid::new_v4();
    let customer_id = Uuid::new_v4();
    let other_customer_id = Uuid::new_v4();

    let queue = CommandQueue::new(Arc::new(MemoryStore::new()), config.queue_config());
    let sessions = Arc::new(StaticSessionVerifier::from_plain_tokens(
        &[(DEVICE_TOKEN, device_id)],
        &[
            (CUSTOMER_TOKEN, customer_id),
            (OTHER_CUSTOMER_TOKEN, other_customer_id),
        ],
    ));

    let app = create_app(config, queue.clone(), sessions);

    TestContext {
        app,
        queue,
        device_id,
        customer_id,
        other_customer_id,
    }
}

/// Build a JSON request with authentication.
pub fn json_request_with_auth(
    method: axum::http::Method,
    uri: &str,
    body: serde_json::Value,
    token: &str,
) -> axum::http::Request<axum::body::Body> {
    use axum::{
        body::Body,
        http::{header, Request},
    };

    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

/// Build a JSON request without any Authorization header.
pub fn json_request_without_auth(
    method: axum::http::Method,
    uri: &str,
    body: serde_json::Value,
) -> axum::http::Request<axum::body::Body> {
    use axum::{
        body::Body,
        http::{header, Request},
    };

    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

/// Build a GET request with authentication.
pub fn get_request_with_auth(uri: &str, token: &str) -> axum::http::Request<axum::body::Body> {
    use axum::{
        body::Body,
        http::{header, Method, Request},
    };

    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

/// Build a DELETE request with authentication.
pub fn delete_request_with_auth(uri: &str, token: &str) -> axum::http::Request<axum::body::Body> {
    use axum::{
        body::Body,
        http::{header, Method, Request},
    };

    Request::builder()
        .method(Method::DELETE)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

/// Helper to parse JSON response body.
pub async fn parse_response_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap_or_else(|_| {
        panic!(
            "Failed to parse response body: {:?}",
            String::from_utf8_lossy(&body)
        )
    })
}
