#[path = "../common/mod.rs"]
mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use common::*;
use licensegate::config::SignatureMode;
use licensegate::crypto::client_signature;
use serde_json::json;
use tower::ServiceExt;

fn client_auth_config(mode: SignatureMode) -> Config {
    let mut config = test_config();
    config.api_security.client_auth_required = true;
    config.api_security.signature_mode = mode;
    config.api_security.api_secret = "shared-secret".to_string();
    config
}

fn signed_request(key: &str, headers: &[(&str, String)]) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri("/api/verify")
        .header("content-type", "application/json");
    for (name, value) in headers {
        builder = builder.header(*name, value);
    }
    builder
        .body(Body::from(
            json!({"license_key": key, "machine_code": "M1"}).to_string(),
        ))
        .unwrap()
}

#[tokio::test]
async fn missing_headers_are_unauthorized() {
    let (app, ctx) = test_app(&client_auth_config(SignatureMode::None));
    let license = issue_license(&ctx);
    let now = ctx.clock.now().to_string();

    let incomplete = [
        vec![],
        vec![("client-id", "app-1".to_string())],
        vec![("client-id", "app-1".to_string()), ("timestamp", now.clone())],
        vec![("client-signature", "sig".to_string()), ("timestamp", now.clone())],
    ];
    for headers in incomplete {
        let response = app
            .clone()
            .oneshot(signed_request(&license.license_key, &headers))
            .await
            .unwrap();
        assert_eq!(
            response.status(),
            StatusCode::UNAUTHORIZED,
            "headers {:?} should not authenticate",
            headers
        );
    }

    let (_, verified) = ctx.engine.usage_logs(None, 10, 0).unwrap();
    assert_eq!(verified, 0, "rejected requests never reach the engine");
}

#[tokio::test]
async fn any_signature_passes_inside_replay_window() {
    let (app, ctx) = test_app(&client_auth_config(SignatureMode::None));
    let license = issue_license(&ctx);

    let headers = [
        ("client-id", "app-1".to_string()),
        ("client-signature", "whatever".to_string()),
        ("timestamp", (ctx.clock.now() - 299).to_string()),
    ];
    let response = app
        .oneshot(signed_request(&license.license_key, &headers))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn stale_or_future_timestamps_are_rejected() {
    let (app, ctx) = test_app(&client_auth_config(SignatureMode::None));
    let license = issue_license(&ctx);

    for offset in [-301, 301] {
        let headers = [
            ("client-id", "app-1".to_string()),
            ("client-signature", "sig".to_string()),
            ("timestamp", (ctx.clock.now() + offset).to_string()),
        ];
        let response = app
            .clone()
            .oneshot(signed_request(&license.license_key, &headers))
            .await
            .unwrap();
        assert_eq!(
            response.status(),
            StatusCode::UNAUTHORIZED,
            "offset {} is outside the replay window",
            offset
        );
    }
}

#[tokio::test]
async fn legacy_prefixed_headers_are_accepted() {
    let (app, ctx) = test_app(&client_auth_config(SignatureMode::None));
    let license = issue_license(&ctx);

    let headers = [
        ("x-client-id", "app-1".to_string()),
        ("x-client-signature", "sig".to_string()),
        ("x-timestamp", ctx.clock.now().to_string()),
    ];
    let response = app
        .oneshot(signed_request(&license.license_key, &headers))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn hmac_policy_requires_valid_signature() {
    let (app, ctx) = test_app(&client_auth_config(SignatureMode::Hmac));
    let license = issue_license(&ctx);
    let timestamp = ctx.clock.now().to_string();

    let bad = [
        ("client-id", "app-1".to_string()),
        ("client-signature", "deadbeef".to_string()),
        ("timestamp", timestamp.clone()),
    ];
    let response = app
        .clone()
        .oneshot(signed_request(&license.license_key, &bad))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let good = [
        ("client-id", "app-1".to_string()),
        (
            "client-signature",
            client_signature("shared-secret", "app-1", &timestamp),
        ),
        ("timestamp", timestamp.clone()),
    ];
    let response = app
        .oneshot(signed_request(&license.license_key, &good))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn admin_and_health_routes_skip_client_auth() {
    let (app, _ctx) = test_app(&client_auth_config(SignatureMode::Hmac));
    let response = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(admin_request(Method::GET, "/admin/api/stats", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
