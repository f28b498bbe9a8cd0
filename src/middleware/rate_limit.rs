use std::sync::Arc;

use axum::{
    extract::Request,
    http::HeaderValue,
    response::{IntoResponse, Response},
};
use futures::FutureExt;
use futures::future::BoxFuture;

use crate::error::AppError;
use crate::pipeline::{ClientInfo, Middleware, Next};
use crate::rate_limit::{RateDecision, RateLimiter, RouteClass};

/// Sliding-window limit per client IP and route class.
#[derive(Clone)]
pub struct RateLimit {
    limiter: Arc<RateLimiter>,
}

impl RateLimit {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }
}

impl Middleware for RateLimit {
    fn handle<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a, Response> {
        async move {
            let client = ClientInfo::of(&req);
            let class = RouteClass::classify(req.uri().path());
            let limit = self.limiter.limit_for(class);

            match self.limiter.check(&client.ip, class) {
                RateDecision::Limited { retry_after } => {
                    tracing::warn!(
                        ip = %client.ip,
                        path = %req.uri().path(),
                        class = class.as_ref(),
                        retry_after,
                        "Rate limit exceeded"
                    );
                    AppError::RateLimited { retry_after }.into_response()
                }
                RateDecision::Allowed { remaining } => {
                    let mut response = next.run(req).await;
                    let headers = response.headers_mut();
                    headers.insert("x-ratelimit-limit", HeaderValue::from(limit.max_requests));
                    headers.insert("x-ratelimit-remaining", HeaderValue::from(remaining));
                    response
                }
            }
        }
        .boxed()
    }
}
