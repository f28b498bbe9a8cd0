use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue, header},
    response::Response,
};
use futures::FutureExt;
use futures::future::BoxFuture;

use crate::pipeline::{Middleware, Next};

const HEADERS: [(HeaderName, &str); 5] = [
    (header::X_FRAME_OPTIONS, "DENY"),
    (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
    (header::X_XSS_PROTECTION, "1; mode=block"),
    (header::REFERRER_POLICY, "strict-origin-when-cross-origin"),
    (
        HeaderName::from_static("permissions-policy"),
        "geolocation=(), microphone=(), camera=()",
    ),
];

/// Adds browser hardening headers to every response.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecurityHeaders;

impl Middleware for SecurityHeaders {
    fn handle<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a, Response> {
        async move {
            let mut response = next.run(req).await;
            let headers = response.headers_mut();
            for (name, value) in HEADERS {
                headers.insert(name, HeaderValue::from_static(value));
            }
            response
        }
        .boxed()
    }
}
