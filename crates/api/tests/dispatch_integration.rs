//! Integration tests for the device-facing dispatch endpoints:
//! claiming commands, extending leases, and submitting results.
//!
//! Run with: cargo test --test dispatch_integration

mod common;

use axum::http::{Method, StatusCode};
use axum::Router;
use chrono::{DateTime, Utc};
use common::{
    get_request_with_auth, json_request_with_auth, json_request_without_auth, parse_response_body,
    test_config, test_context, test_context_with_config, CUSTOMER_TOKEN, DEVICE_TOKEN,
};
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;

/// Issue a command over HTTP as the primary customer.
async fn seed_command(app: &Router, device_id: Uuid, body: serde_json::Value) -> serde_json::Value {
    let request = json_request_with_auth(
        Method::POST,
        &format!("/api/admin/v1/devices/{}/commands", device_id),
        body,
        CUSTOMER_TOKEN,
    );
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    parse_response_body(response).await
}

/// Claim commands as the test device and return the response body.
async fn claim(app: &Router, body: serde_json::Value) -> serde_json::Value {
    let request = json_request_with_auth(Method::POST, "/api/v1/commands/claim", body, DEVICE_TOKEN);
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    parse_response_body(response).await
}

// ============================================================================
// Claim Tests
// ============================================================================

#[tokio::test]
async fn test_claim_empty_queue() {
    let ctx = test_context();

    let body = claim(&ctx.app, json!({})).await;
    assert_eq!(body["commands"], json!([]));
}

#[tokio::test]
async fn test_claim_returns_lowest_priority_first() {
    let ctx = test_context();

    seed_command(
        &ctx.app,
        ctx.device_id,
        json!({"command_type": "low", "priority": 7}),
    )
    .await;
    seed_command(
        &ctx.app,
        ctx.device_id,
        json!({"command_type": "urgent", "priority": 1}),
    )
    .await;
    seed_command(
        &ctx.app,
        ctx.device_id,
        json!({"command_type": "normal", "priority": 5}),
    )
    .await;

    let body = claim(&ctx.app, json!({"limit": 3})).await;
    let commands = body["commands"].as_array().unwrap();
    assert_eq!(commands.len(), 3);

    let types: Vec<&str> = commands
        .iter()
        .map(|c| c["command_type"].as_str().unwrap())
        .collect();
    assert_eq!(types, vec!["urgent", "normal", "low"]);
}

#[tokio::test]
async fn test_claim_hands_out_lease() {
    let ctx = test_context();

    seed_command(&ctx.app, ctx.device_id, json!({"command_type": "reboot"})).await;

    let body = claim(&ctx.app, json!({})).await;
    let commands = body["commands"].as_array().unwrap();
    assert_eq!(commands.len(), 1);

    let cmd = &commands[0];
    assert!(cmd.get("id").is_some());
    assert!(cmd.get("visible_until").is_some());

    // 32 lowercase hex characters
    let token = cmd["claim_token"].as_str().unwrap();
    assert_eq!(token.len(), 32);
    assert!(token.chars().all(|c| c.is_ascii_hexdigit()));

    // The device does not learn who issued the command
    assert!(cmd.get("customer_id").is_none());
    assert!(cmd.get("device_id").is_none());
}

#[tokio::test]
async fn test_claimed_command_visible_to_customer_without_token() {
    let ctx = test_context();

    let created = seed_command(&ctx.app, ctx.device_id, json!({"command_type": "reboot"})).await;
    let id = created["id"].as_str().unwrap();

    claim(&ctx.app, json!({})).await;

    let request = get_request_with_auth(&format!("/api/admin/v1/commands/{}", id), CUSTOMER_TOKEN);
    let response = ctx.app.clone().oneshot(request).await.unwrap();
    let body = parse_response_body(response).await;

    assert_eq!(body["status"], "claimed");
    assert!(body.get("claimed_at").is_some());
    assert!(body.get("visible_until").is_some());
    // The claim token stays between the queue and the claiming device
    assert!(body.get("claim_token").is_none());
}

#[tokio::test]
async fn test_claim_respects_limit_and_drains() {
    let ctx = test_context();

    for i in 0..3 {
        seed_command(
            &ctx.app,
            ctx.device_id,
            json!({"command_type": format!("job_{}", i)}),
        )
        .await;
    }

    let body = claim(&ctx.app, json!({"limit": 2})).await;
    assert_eq!(body["commands"].as_array().unwrap().len(), 2);

    let body = claim(&ctx.app, json!({"limit": 2})).await;
    assert_eq!(body["commands"].as_array().unwrap().len(), 1);

    let body = claim(&ctx.app, json!({"limit": 2})).await;
    assert_eq!(body["commands"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_claim_default_limit_is_one() {
    let ctx = test_context();

    seed_command(&ctx.app, ctx.device_id, json!({"command_type": "a"})).await;
    seed_command(&ctx.app, ctx.device_id, json!({"command_type": "b"})).await;

    let body = claim(&ctx.app, json!({})).await;
    assert_eq!(body["commands"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_claim_rejects_out_of_range_limit() {
    let ctx = test_context();

    for limit in [0, 101] {
        let request = json_request_with_auth(
            Method::POST,
            "/api/v1/commands/claim",
            json!({"limit": limit}),
            DEVICE_TOKEN,
        );
        let response = ctx.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = parse_response_body(response).await;
        assert_eq!(body["error"], "validation_error");
    }
}

#[tokio::test]
async fn test_claim_rejects_out_of_range_visibility_timeout() {
    let ctx = test_context();

    let request = json_request_with_auth(
        Method::POST,
        "/api/v1/commands/claim",
        json!({"visibility_timeout_ms": 10}),
        DEVICE_TOKEN,
    );
    let response = ctx.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_claim_requires_device_session() {
    let ctx = test_context();

    // No token
    let request = json_request_without_auth(Method::POST, "/api/v1/commands/claim", json!({}));
    let response = ctx.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // A customer session is not a device session
    let request =
        json_request_with_auth(Method::POST, "/api/v1/commands/claim", json!({}), CUSTOMER_TOKEN);
    let response = ctx.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// ============================================================================
// Extend Visibility Tests
// ============================================================================

#[tokio::test]
async fn test_extend_visibility_success() {
    let ctx = test_context();

    seed_command(&ctx.app, ctx.device_id, json!({"command_type": "backup"})).await;
    let body = claim(&ctx.app, json!({})).await;
    let cmd = &body["commands"][0];
    let id = cmd["id"].as_str().unwrap();
    let token = cmd["claim_token"].as_str().unwrap();
    let old_visible: DateTime<Utc> = cmd["visible_until"].as_str().unwrap().parse().unwrap();

    let request = json_request_with_auth(
        Method::POST,
        &format!("/api/v1/commands/{}/extend", id),
        json!({"claim_token": token}),
        DEVICE_TOKEN,
    );
    let response = ctx.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = parse_response_body(response).await;
    assert_eq!(body["command_id"], id);
    let new_visible: DateTime<Utc> = body["visible_until"].as_str().unwrap().parse().unwrap();
    assert!(new_visible > old_visible);
}

#[tokio::test]
async fn test_extend_visibility_rejects_wrong_token() {
    let ctx = test_context();

    seed_command(&ctx.app, ctx.device_id, json!({"command_type": "backup"})).await;
    let body = claim(&ctx.app, json!({})).await;
    let id = body["commands"][0]["id"].as_str().unwrap();

    let request = json_request_with_auth(
        Method::POST,
        &format!("/api/v1/commands/{}/extend", id),
        json!({"claim_token": "00000000000000000000000000000000"}),
        DEVICE_TOKEN,
    );
    let response = ctx.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let body = parse_response_body(response).await;
    assert_eq!(body["error"], "invalid_claim");
}

#[tokio::test]
async fn test_extend_visibility_unknown_command() {
    let ctx = test_context();

    let request = json_request_with_auth(
        Method::POST,
        &format!("/api/v1/commands/{}/extend", Uuid::new_v4()),
        json!({"claim_token": "00000000000000000000000000000000"}),
        DEVICE_TOKEN,
    );
    let response = ctx.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_extend_visibility_rejects_expired_lease() {
    let ctx = test_context();

    seed_command(&ctx.app, ctx.device_id, json!({"command_type": "backup"})).await;
    // Claim with the smallest permitted lease, then let it lapse
    let body = claim(&ctx.app, json!({"visibility_timeout_ms": 1000})).await;
    let cmd = &body["commands"][0];
    let id = cmd["id"].as_str().unwrap();
    let token = cmd["claim_token"].as_str().unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

    let request = json_request_with_auth(
        Method::POST,
        &format!("/api/v1/commands/{}/extend", id),
        json!({"claim_token": token}),
        DEVICE_TOKEN,
    );
    let response = ctx.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let body = parse_response_body(response).await;
    assert_eq!(body["error"], "invalid_claim");
}

// ============================================================================
// Submit Result Tests
// ============================================================================

#[tokio::test]
async fn test_submit_result_success() {
    let ctx = test_context();

    let created = seed_command(&ctx.app, ctx.device_id, json!({"command_type": "backup"})).await;
    let id = created["id"].as_str().unwrap();

    let body = claim(&ctx.app, json!({})).await;
    let token = body["commands"][0]["claim_token"].as_str().unwrap();

    let request = json_request_with_auth(
        Method::POST,
        &format!("/api/v1/commands/{}/result", id),
        json!({"claim_token": token, "result": {"exit_code": 0, "bytes": 10240}}),
        DEVICE_TOKEN,
    );
    let response = ctx.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = parse_response_body(response).await;
    assert_eq!(body["command_id"], id);
    assert_eq!(body["status"], "completed");
    assert!(body.get("completed_at").is_some());

    // The customer sees the stored result
    let request = get_request_with_auth(&format!("/api/admin/v1/commands/{}", id), CUSTOMER_TOKEN);
    let response = ctx.app.clone().oneshot(request).await.unwrap();
    let body = parse_response_body(response).await;
    assert_eq!(body["status"], "completed");
    assert_eq!(body["result"], json!({"exit_code": 0, "bytes": 10240}));
}

#[tokio::test]
async fn test_submit_result_repeat_conflicts() {
    let ctx = test_context();

    let created = seed_command(&ctx.app, ctx.device_id, json!({"command_type": "backup"})).await;
    let id = created["id"].as_str().unwrap();

    let body = claim(&ctx.app, json!({})).await;
    let token = body["commands"][0]["claim_token"].as_str().unwrap().to_string();

    let request = json_request_with_auth(
        Method::POST,
        &format!("/api/v1/commands/{}/result", id),
        json!({"claim_token": token, "result": {"first": true}}),
        DEVICE_TOKEN,
    );
    let response = ctx.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // A retry of the same submission conflicts and does not overwrite
    let request = json_request_with_auth(
        Method::POST,
        &format!("/api/v1/commands/{}/result", id),
        json!({"claim_token": token, "result": {"first": false}}),
        DEVICE_TOKEN,
    );
    let response = ctx.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let body = parse_response_body(response).await;
    assert_eq!(body["error"], "already_completed");

    let request = get_request_with_auth(&format!("/api/admin/v1/commands/{}", id), CUSTOMER_TOKEN);
    let response = ctx.app.clone().oneshot(request).await.unwrap();
    let body = parse_response_body(response).await;
    assert_eq!(body["result"], json!({"first": true}));
}

#[tokio::test]
async fn test_submit_result_rejects_wrong_token() {
    let ctx = test_context();

    let created = seed_command(&ctx.app, ctx.device_id, json!({"command_type": "backup"})).await;
    let id = created["id"].as_str().unwrap();
    claim(&ctx.app, json!({})).await;

    let request = json_request_with_auth(
        Method::POST,
        &format!("/api/v1/commands/{}/result", id),
        json!({"claim_token": "ffffffffffffffffffffffffffffffff", "result": {}}),
        DEVICE_TOKEN,
    );
    let response = ctx.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let body = parse_response_body(response).await;
    assert_eq!(body["error"], "invalid_claim");
}

#[tokio::test]
async fn test_submit_result_honored_after_lease_expiry() {
    let ctx = test_context();

    let created = seed_command(&ctx.app, ctx.device_id, json!({"command_type": "slow"})).await;
    let id = created["id"].as_str().unwrap();

    let body = claim(&ctx.app, json!({"visibility_timeout_ms": 1000})).await;
    let token = body["commands"][0]["claim_token"].as_str().unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

    // The lease lapsed but no sweep ran, so the late result still lands
    let request = json_request_with_auth(
        Method::POST,
        &format!("/api/v1/commands/{}/result", id),
        json!({"claim_token": token, "result": {"late": true}}),
        DEVICE_TOKEN,
    );
    let response = ctx.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_submit_result_rejected_after_sweep_requeues() {
    let ctx = test_context();

    let created = seed_command(&ctx.app, ctx.device_id, json!({"command_type": "slow"})).await;
    let id = created["id"].as_str().unwrap();

    let body = claim(&ctx.app, json!({"visibility_timeout_ms": 1000})).await;
    let token = body["commands"][0]["claim_token"].as_str().unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

    // The sweeper returns the command to the pending queue
    let stats = ctx.queue.reclaim_expired().await.unwrap();
    assert_eq!(stats.reclaimed, 1);

    // The old token no longer authorizes a submission
    let request = json_request_with_auth(
        Method::POST,
        &format!("/api/v1/commands/{}/result", id),
        json!({"claim_token": token, "result": {"stale": true}}),
        DEVICE_TOKEN,
    );
    let response = ctx.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let body = parse_response_body(response).await;
    assert_eq!(body["error"], "invalid_claim");

    // And the command is claimable again
    let body = claim(&ctx.app, json!({})).await;
    assert_eq!(body["commands"][0]["id"], id);
}

// ============================================================================
// Rate Limiting Tests
// ============================================================================

#[tokio::test]
async fn test_device_rate_limit_enforced() {
    let mut config = test_config();
    config.security.device_rate_limit_per_minute = 1;
    let ctx = test_context_with_config(config);

    // First call passes
    let request =
        json_request_with_auth(Method::POST, "/api/v1/commands/claim", json!({}), DEVICE_TOKEN);
    let response = ctx.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Second call within the same minute is limited
    let request =
        json_request_with_auth(Method::POST, "/api/v1/commands/claim", json!({}), DEVICE_TOKEN);
    let response = ctx.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key("retry-after"));

    let body = parse_response_body(response).await;
    assert_eq!(body["error"], "rate_limited");
}
