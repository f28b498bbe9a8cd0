use axum::{
    extract::Request,
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use futures::FutureExt;
use futures::future::BoxFuture;

use crate::crypto::secrets_match;
use crate::error::AppError;
use crate::pipeline::{ClientInfo, Middleware, Next};
use crate::util::extract_bearer_token;

/// Decides whether a request carries a valid admin session.
pub trait SessionValidator: Send + Sync {
    fn is_valid(&self, headers: &HeaderMap) -> bool;
}

/// Accepts `Authorization: Bearer <ADMIN_TOKEN>`. Without a configured token
/// nothing is accepted.
#[derive(Clone, Default)]
pub struct AdminTokenValidator {
    token: Option<String>,
}

impl AdminTokenValidator {
    pub fn new(token: Option<String>) -> Self {
        Self { token }
    }
}

impl SessionValidator for AdminTokenValidator {
    fn is_valid(&self, headers: &HeaderMap) -> bool {
        match (&self.token, extract_bearer_token(headers)) {
            (Some(expected), Some(provided)) => secrets_match(expected, provided),
            _ => false,
        }
    }
}

pub struct AdminSession {
    validator: Box<dyn SessionValidator>,
}

impl AdminSession {
    pub fn new(validator: impl SessionValidator + 'static) -> Self {
        Self {
            validator: Box::new(validator),
        }
    }
}

impl Middleware for AdminSession {
    fn handle<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a, Response> {
        async move {
            if !self.validator.is_valid(req.headers()) {
                let client = ClientInfo::of(&req);
                tracing::warn!(
                    ip = %client.ip,
                    path = %req.uri().path(),
                    "Admin request without a valid session"
                );
                return AppError::Unauthorized("Admin session required".into()).into_response();
            }
            next.run(req).await
        }
        .boxed()
    }
}
