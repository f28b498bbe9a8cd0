//! Route table and pipeline assembly.

pub mod admin;
pub mod api;
mod health;

pub use health::*;

use std::sync::Arc;

use crate::clock::Clock;
use crate::config::{Config, SignatureMode};
use crate::crypto::PayloadCipher;
use crate::db::AppState;
use crate::middleware::{
    AdminSession, AdminTokenValidator, ApiKeyAuth, ClientAuth, Cors, HmacSignature,
    PayloadCrypto, RateLimit, SecurityHeaders,
};
use crate::pipeline::{Middleware, Pipeline, Router};
use crate::rate_limit::RateLimiter;

/// Build the full request pipeline.
///
/// Global stages, outermost first: security headers, CORS, rate limiting.
/// `/api` adds client authentication, the API key check and payload
/// encryption as configured. `/admin/api` requires an admin session.
pub fn build_pipeline(
    state: AppState,
    config: &Config,
    clock: Arc<dyn Clock>,
    limiter: Arc<RateLimiter>,
) -> Pipeline<AppState> {
    let router = Router::new(state)
        .get("/health", health)
        .group("/api", api_middleware(config, clock), |r| {
            r.post("/verify", api::verify_license)
        })
        .group("/admin/api", admin_middleware(config), |r| {
            r.get("/stats", admin::license_stats)
                .get("/licenses", admin::list_licenses)
                .post("/licenses", admin::create_license)
                .post("/licenses/batch", admin::create_license_batch)
                .post("/licenses/reorder-ids", admin::reorder_license_ids)
                .get("/licenses/{id}", admin::get_license)
                .put("/licenses/{id}", admin::update_license)
                .delete("/licenses/{id}", admin::delete_license)
                .post("/licenses/{id}/disable", admin::disable_license)
                .post("/licenses/{id}/enable", admin::enable_license)
                .post("/licenses/{id}/unbind", admin::unbind_license)
                .post("/licenses/{id}/extend", admin::extend_license)
                .get("/logs/usage", admin::list_usage_logs)
                .get("/logs/admin", admin::list_admin_logs)
                .post("/logs/purge", admin::purge_logs)
        });

    Pipeline::new(router)
        .layer(SecurityHeaders)
        .layer(Cors::new(&config.cors_allowed_origin))
        .layer(RateLimit::new(limiter))
        .trust_proxy_headers(config.trust_proxy_headers)
        .debug(config.debug)
}

fn api_middleware(config: &Config, clock: Arc<dyn Clock>) -> Vec<Arc<dyn Middleware>> {
    let security = &config.api_security;
    let mut stages: Vec<Arc<dyn Middleware>> = Vec::new();

    if security.client_auth_required {
        let auth = match security.signature_mode {
            SignatureMode::None => ClientAuth::new(clock),
            SignatureMode::Hmac => {
                ClientAuth::with_policy(clock, HmacSignature::new(security.api_secret.clone()))
            }
        };
        stages.push(Arc::new(auth));
    }

    if security.api_key_required {
        stages.push(Arc::new(ApiKeyAuth::new(security.api_secret.clone())));
    }

    if let Some(method) = security.encryption {
        match PayloadCipher::new(method, &security.api_secret) {
            Some(cipher) => stages.push(Arc::new(PayloadCrypto::new(cipher))),
            None => tracing::warn!(
                method = method.name(),
                "API_ENCRYPT_METHOD is set but API_SECRET_KEY is empty, payload encryption disabled"
            ),
        }
    }

    stages
}

fn admin_middleware(config: &Config) -> Vec<Arc<dyn Middleware>> {
    if config.admin_token.is_none() {
        tracing::warn!("ADMIN_TOKEN is not set, the admin API will reject every request");
    }
    let session: Arc<dyn Middleware> = Arc::new(AdminSession::new(AdminTokenValidator::new(
        config.admin_token.clone(),
    )));
    vec![session]
}
