//! Test utilities and fixtures for licensegate integration tests

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, Response};
use serde_json::Value;

pub use licensegate::audit::{AuditSink, Origin};
pub use licensegate::clock::{Clock, ManualClock, SECONDS_PER_DAY};
pub use licensegate::config::{ApiSecurityConfig, Config, RateLimitConfig, WindowLimit};
pub use licensegate::db::{AppState, DbPool, create_memory_pool, create_pool, init_audit_db, init_db};
pub use licensegate::engine::{KeyFormat, LicenseEngine, VerifyFailure, VerifyResult, VerifyStatus};
pub use licensegate::handlers;
pub use licensegate::models::*;
pub use licensegate::rate_limit::RateLimiter;

/// 2024-01-01T00:00:00Z
pub const TEST_EPOCH: i64 = 1_704_067_200;

pub const ADMIN_TOKEN: &str = "test-admin-token";

/// Engine plus everything a test needs to poke at it.
pub struct TestContext {
    pub state: AppState,
    pub engine: LicenseEngine,
    /// Main database pool, for tests that tamper with the schema
    pub db: DbPool,
    pub clock: Arc<ManualClock>,
}

fn memory_pools() -> (DbPool, DbPool) {
    let db = create_memory_pool().expect("Failed to create in-memory pool");
    {
        let conn = db.get().unwrap();
        init_db(&conn).expect("Failed to initialize schema");
    }
    let audit = create_memory_pool().expect("Failed to create in-memory audit pool");
    {
        let conn = audit.get().unwrap();
        init_audit_db(&conn).expect("Failed to initialize audit schema");
    }
    (db, audit)
}

fn context_from_pools(db: DbPool, audit: DbPool) -> TestContext {
    let clock = Arc::new(ManualClock::new(TEST_EPOCH));
    let engine = LicenseEngine::new(
        db.clone(),
        AuditSink::new(audit, true),
        clock.clone(),
        KeyFormat::default(),
    );
    TestContext {
        state: AppState {
            engine: engine.clone(),
        },
        engine,
        db,
        clock,
    }
}

/// Engine over in-memory databases with a manual clock at [`TEST_EPOCH`].
pub fn setup_engine() -> TestContext {
    let (db, audit) = memory_pools();
    context_from_pools(db, audit)
}

/// Engine over database files in `dir`, for tests that need several
/// connections at once.
pub fn setup_file_engine(dir: &std::path::Path) -> TestContext {
    let db = create_pool(dir.join("licenses.db").to_str().unwrap()).unwrap();
    {
        let conn = db.get().unwrap();
        init_db(&conn).unwrap();
    }
    let audit = create_pool(dir.join("audit.db").to_str().unwrap()).unwrap();
    {
        let conn = audit.get().unwrap();
        init_audit_db(&conn).unwrap();
    }
    context_from_pools(db, audit)
}

/// Configuration with every optional API guard switched off.
pub fn test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        database_path: ":memory:".to_string(),
        audit_database_path: ":memory:".to_string(),
        debug: false,
        audit_log_enabled: true,
        usage_log_retention_days: 90,
        admin_log_retention_days: 180,
        key_format: KeyFormat::default(),
        api_security: ApiSecurityConfig::default(),
        rate_limit: RateLimitConfig::default(),
        trust_proxy_headers: false,
        cors_allowed_origin: "*".to_string(),
        admin_token: Some(ADMIN_TOKEN.to_string()),
    }
}

/// Full application (pipeline mounted in axum) for `config`.
pub fn test_app(config: &Config) -> (axum::Router, TestContext) {
    let ctx = setup_engine();
    let clock: Arc<dyn Clock> = ctx.clock.clone();
    let limiter = Arc::new(RateLimiter::new(config.rate_limit, clock.clone()));
    let app = handlers::build_pipeline(ctx.state.clone(), config, clock, limiter).into_axum();
    (app, ctx)
}

/// Issue a license through the engine with a 30 day duration.
pub fn issue_license(ctx: &TestContext) -> License {
    ctx.engine
        .issue(30, None, None, &Origin::system())
        .expect("Failed to issue license")
}

pub fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn admin_request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {}", ADMIN_TOKEN));
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = body_bytes(response).await;
    serde_json::from_slice(&bytes).expect("Response body is not JSON")
}
