#[path = "../common/mod.rs"]
mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use common::*;
use serde_json::json;
use tower::ServiceExt;

fn api_key_config(secret: &str) -> Config {
    let mut config = test_config();
    config.api_security.api_key_required = true;
    config.api_security.api_secret = secret.to_string();
    config
}

fn request(uri: &str, key: &str, header: Option<(&str, String)>) -> Request<Body> {
    let mut builder = Request::builder().method(Method::POST).uri(uri);
    if let Some((name, value)) = header {
        builder = builder.header(name, value);
    }
    builder
        .body(Body::from(
            json!({"license_key": key, "machine_code": "M1"}).to_string(),
        ))
        .unwrap()
}

#[tokio::test]
async fn key_accepted_from_header_bearer_or_query() {
    let (app, ctx) = test_app(&api_key_config("k-123"));
    let license = issue_license(&ctx);
    let key = license.license_key.as_str();

    let accepted = [
        request("/api/verify", key, Some(("x-api-key", "k-123".into()))),
        request("/api/verify", key, Some(("authorization", "Bearer k-123".into()))),
        request("/api/verify?api_key=k-123", key, None),
    ];
    for req in accepted {
        let response = app.clone().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn header_wins_over_query() {
    let (app, ctx) = test_app(&api_key_config("k-123"));
    let license = issue_license(&ctx);

    let req = request(
        "/api/verify?api_key=k-123",
        &license.license_key,
        Some(("x-api-key", "wrong".into())),
    );
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(
        response.status(),
        StatusCode::UNAUTHORIZED,
        "the X-API-Key header is checked first"
    );
}

#[tokio::test]
async fn missing_or_wrong_key_is_unauthorized() {
    let (app, ctx) = test_app(&api_key_config("k-123"));
    let license = issue_license(&ctx);

    for req in [
        request("/api/verify", &license.license_key, None),
        request("/api/verify", &license.license_key, Some(("x-api-key", "k-124".into()))),
    ] {
        let response = app.clone().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
    }
}

#[tokio::test]
async fn empty_secret_fails_closed() {
    let (app, ctx) = test_app(&api_key_config(""));
    let license = issue_license(&ctx);

    let req = request("/api/verify", &license.license_key, Some(("x-api-key", "".into())));
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
