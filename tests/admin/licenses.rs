#[path = "../common/mod.rs"]
mod common;

use axum::http::{Method, StatusCode};
use common::*;
use serde_json::json;
use tower::ServiceExt;

#[tokio::test]
async fn create_and_fetch_license() {
    let (app, _ctx) = test_app(&test_config());

    let response = app
        .clone()
        .oneshot(admin_request(
            Method::POST,
            "/admin/api/licenses",
            Some(json!({"duration_days": 45})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    assert_eq!(created["status"], "unused");
    assert_eq!(created["duration_days"], 45);
    assert_eq!(created["expires_at"], TEST_EPOCH + 45 * SECONDS_PER_DAY);

    let id = created["id"].as_i64().unwrap();
    let response = app
        .oneshot(admin_request(
            Method::GET,
            &format!("/admin/api/licenses/{}", id),
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let fetched = body_json(response).await;
    assert_eq!(fetched["license_key"], created["license_key"]);
}

#[tokio::test]
async fn create_with_override_and_format() {
    let (app, _ctx) = test_app(&test_config());

    let response = app
        .clone()
        .oneshot(admin_request(
            Method::POST,
            "/admin/api/licenses",
            Some(json!({"duration_days": 30, "license_key": "VIP-000001"})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body_json(response).await["license_key"], "VIP-000001");

    let response = app
        .clone()
        .oneshot(admin_request(
            Method::POST,
            "/admin/api/licenses",
            Some(json!({"duration_days": 30, "license_key": "VIP-000001"})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .oneshot(admin_request(
            Method::POST,
            "/admin/api/licenses",
            Some(json!({
                "duration_days": 30,
                "format": {"prefix": "ent", "length": 12, "charset": "0123456789"}
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let key = body_json(response).await["license_key"]
        .as_str()
        .unwrap()
        .to_string();
    assert_eq!(key.len(), 12);
    assert!(key.starts_with("ent"));
    assert!(key[3..].chars().all(|c| c.is_ascii_digit()));
}

#[tokio::test]
async fn invalid_duration_is_unprocessable() {
    let (app, _ctx) = test_app(&test_config());
    let response = app
        .oneshot(admin_request(
            Method::POST,
            "/admin/api/licenses",
            Some(json!({"duration_days": 0})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn batch_create() {
    let (app, ctx) = test_app(&test_config());

    let response = app
        .clone()
        .oneshot(admin_request(
            Method::POST,
            "/admin/api/licenses/batch",
            Some(json!({"count": 5, "duration_days": 7})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["count"], 5);
    assert_eq!(body["licenses"].as_array().unwrap().len(), 5);
    assert_eq!(ctx.engine.stats().unwrap().total, 5);

    let response = app
        .oneshot(admin_request(
            Method::POST,
            "/admin/api/licenses/batch",
            Some(json!({"count": 101, "duration_days": 7})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(ctx.engine.stats().unwrap().total, 5);
}

#[tokio::test]
async fn list_with_filters_and_pagination() {
    let (app, ctx) = test_app(&test_config());
    for _ in 0..7 {
        issue_license(&ctx);
    }
    ctx.engine.disable(2, &Origin::system()).unwrap();

    let response = app
        .clone()
        .oneshot(admin_request(
            Method::GET,
            "/admin/api/licenses?limit=3&offset=1",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let page = body_json(response).await;
    assert_eq!(page["total"], 7);
    assert_eq!(page["limit"], 3);
    assert_eq!(page["offset"], 1);
    let ids: Vec<i64> = page["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|l| l["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![6, 5, 4]);

    let response = app
        .clone()
        .oneshot(admin_request(
            Method::GET,
            "/admin/api/licenses?status=disabled",
            None,
        ))
        .await
        .unwrap();
    let page = body_json(response).await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["id"], 2);

    let response = app
        .oneshot(admin_request(
            Method::GET,
            "/admin/api/licenses?status=bogus",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn state_changes_over_http() {
    let (app, ctx) = test_app(&test_config());
    let license = issue_license(&ctx);
    ctx.engine
        .verify(&license.license_key, "M1", &Origin::system())
        .unwrap();
    let base = format!("/admin/api/licenses/{}", license.id);

    let call = |path: String, body: Option<serde_json::Value>| {
        let app = app.clone();
        async move {
            let response = app
                .oneshot(admin_request(Method::POST, &path, body))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "POST {}", path);
            body_json(response).await
        }
    };

    let body = call(format!("{}/disable", base), None).await;
    assert_eq!(body["status"], "disabled");

    let body = call(format!("{}/enable", base), None).await;
    assert_eq!(body["status"], "used");

    let body = call(format!("{}/unbind", base), None).await;
    assert_eq!(body["status"], "unused");
    assert!(body["machine_code"].is_null());

    let body = call(format!("{}/extend", base), Some(json!({"days": 10}))).await;
    assert_eq!(body["expires_at"], license.expires_at + 10 * SECONDS_PER_DAY);
}

#[tokio::test]
async fn update_note_and_delete() {
    let (app, ctx) = test_app(&test_config());
    let license = issue_license(&ctx);
    let path = format!("/admin/api/licenses/{}", license.id);

    let response = app
        .clone()
        .oneshot(admin_request(
            Method::PUT,
            &path,
            Some(json!({"machine_note": "front desk"})),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["machine_note"], "front desk");

    let response = app
        .clone()
        .oneshot(admin_request(Method::DELETE, &path, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["deleted"], license.id);

    let response = app
        .oneshot(admin_request(Method::GET, &path, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn reorder_ids_over_http() {
    let (app, ctx) = test_app(&test_config());
    for _ in 0..4 {
        issue_license(&ctx);
    }
    ctx.engine.delete(1, &Origin::system()).unwrap();
    ctx.engine.delete(3, &Origin::system()).unwrap();

    let response = app
        .oneshot(admin_request(
            Method::POST,
            "/admin/api/licenses/reorder-ids",
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["reordered"], 2);
    assert!(ctx.engine.get(1).is_ok());
    assert!(ctx.engine.get(2).is_ok());
    assert!(ctx.engine.get(4).is_err());
}

#[tokio::test]
async fn bad_path_parameter() {
    let (app, _ctx) = test_app(&test_config());
    let response = app
        .oneshot(admin_request(Method::GET, "/admin/api/licenses/abc", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn stats_endpoint() {
    let (app, ctx) = test_app(&test_config());
    issue_license(&ctx);
    let second = issue_license(&ctx);
    ctx.engine.disable(second.id, &Origin::system()).unwrap();

    let response = app
        .oneshot(admin_request(Method::GET, "/admin/api/stats", None))
        .await
        .unwrap();
    let stats = body_json(response).await;
    assert_eq!(stats["total"], 2);
    assert_eq!(stats["unused"], 1);
    assert_eq!(stats["disabled"], 1);
    assert_eq!(stats["used"], 0);
}
