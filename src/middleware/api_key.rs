use axum::{
    extract::Request,
    response::{IntoResponse, Response},
};
use futures::FutureExt;
use futures::future::BoxFuture;

use crate::crypto::secrets_match;
use crate::error::AppError;
use crate::pipeline::{ClientInfo, Middleware, Next};
use crate::util::{extract_bearer_token, header_value, query_param};

/// Shared API key check.
///
/// The key is taken from `X-API-Key`, then `Authorization: Bearer`, then the
/// `api_key` query parameter. An empty configured secret rejects everything.
#[derive(Clone)]
pub struct ApiKeyAuth {
    secret: String,
}

impl ApiKeyAuth {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    fn provided_key(req: &Request) -> Option<String> {
        header_value(req.headers(), &["x-api-key"])
            .or_else(|| extract_bearer_token(req.headers()))
            .map(String::from)
            .or_else(|| query_param(req.uri(), "api_key"))
    }

    fn authenticate(&self, req: &Request) -> Result<(), AppError> {
        if self.secret.is_empty() {
            tracing::warn!("API key enforcement is on but API_SECRET_KEY is empty");
            return Err(AppError::Unauthorized("API key not configured".into()));
        }
        let provided = Self::provided_key(req)
            .ok_or_else(|| AppError::Unauthorized("Missing API key".into()))?;
        if !secrets_match(&self.secret, &provided) {
            return Err(AppError::Unauthorized("Invalid API key".into()));
        }
        Ok(())
    }
}

impl Middleware for ApiKeyAuth {
    fn handle<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a, Response> {
        async move {
            if let Err(err) = self.authenticate(&req) {
                let client = ClientInfo::of(&req);
                tracing::warn!(
                    ip = %client.ip,
                    path = %req.uri().path(),
                    "API key check failed: {}",
                    err
                );
                return err.into_response();
            }
            next.run(req).await
        }
        .boxed()
    }
}
