use axum::{
    body::Body,
    extract::Request,
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    response::Response,
};
use futures::FutureExt;
use futures::future::BoxFuture;

use crate::pipeline::{Middleware, Next};

const ALLOW_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS";
const ALLOW_HEADERS: &str = "Content-Type, Authorization, X-Requested-With, X-API-Key, \
     Client-ID, Client-Signature, Timestamp, Encrypted-Data, \
     X-Client-ID, X-Client-Signature, X-Timestamp, X-Encrypted-Data";
const EXPOSE_HEADERS: &str = "Encrypted-Response, Encryption-Method, Retry-After";
const MAX_AGE: &str = "86400";

/// CORS headers on every response; preflight requests end here with 204.
#[derive(Debug, Clone)]
pub struct Cors {
    allowed_origin: HeaderValue,
}

impl Cors {
    pub fn new(allowed_origin: &str) -> Self {
        let allowed_origin = HeaderValue::from_str(allowed_origin).unwrap_or_else(|_| {
            tracing::warn!(
                "Invalid CORS_ALLOWED_ORIGIN {:?}, falling back to *",
                allowed_origin
            );
            HeaderValue::from_static("*")
        });
        Self { allowed_origin }
    }

    fn apply(&self, headers: &mut HeaderMap) {
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            self.allowed_origin.clone(),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOW_METHODS),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOW_HEADERS),
        );
        headers.insert(
            header::ACCESS_CONTROL_EXPOSE_HEADERS,
            HeaderValue::from_static(EXPOSE_HEADERS),
        );
        headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static(MAX_AGE));
    }
}

impl Middleware for Cors {
    fn handle<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a, Response> {
        async move {
            let mut response = if req.method() == Method::OPTIONS {
                let mut preflight = Response::new(Body::empty());
                *preflight.status_mut() = StatusCode::NO_CONTENT;
                preflight
            } else {
                next.run(req).await
            };
            self.apply(response.headers_mut());
            response
        }
        .boxed()
    }
}
