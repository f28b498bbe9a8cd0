//! Request pipeline: onion-style middleware around a first-match router.
//!
//! Each [`Middleware`] receives the request and a [`Next`] continuation. It
//! may change the request, call `next.run(req)` and then change the
//! response, or return a response without calling `next` at all.
//!
//! The pipeline is hosted inside axum as the fallback handler, so axum only
//! provides the connection handling and tower-http tracing around it.

mod router;

pub use router::{PathPattern, RouteParams, Router};

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::{Body, to_bytes},
    extract::{ConnectInfo, Request},
    http::{HeaderValue, header},
    response::Response,
};
use futures::future::BoxFuture;
use serde_json::Value;

use crate::audit::Origin;
use crate::error::ErrorDetail;
use crate::util;

/// Largest response body the pipeline will buffer to rewrite.
pub(crate) const MAX_BUFFERED_BODY: usize = 2 * 1024 * 1024;

pub trait Middleware: Send + Sync + 'static {
    fn handle<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a, Response>;
}

/// Innermost stage of a chain: the router, or a single route handler.
pub trait Endpoint: Send + Sync {
    fn call(&self, req: Request) -> BoxFuture<'_, Response>;
}

/// The rest of the chain after the current middleware.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    middleware: &'a [Arc<dyn Middleware>],
    endpoint: &'a dyn Endpoint,
}

impl<'a> Next<'a> {
    pub fn new(middleware: &'a [Arc<dyn Middleware>], endpoint: &'a dyn Endpoint) -> Self {
        Self {
            middleware,
            endpoint,
        }
    }

    pub fn run(self, req: Request) -> BoxFuture<'a, Response> {
        match self.middleware.split_first() {
            Some((first, rest)) => first.handle(
                req,
                Next {
                    middleware: rest,
                    endpoint: self.endpoint,
                },
            ),
            None => self.endpoint.call(req),
        }
    }
}

/// Per-request client identity, computed once before the chain runs and
/// stored in the request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip: String,
    pub user_agent: Option<String>,
}

impl ClientInfo {
    pub fn from_request(req: &Request, trust_proxy_headers: bool) -> Self {
        let forwarded = if trust_proxy_headers {
            util::forwarded_ip(req.headers())
        } else {
            None
        };
        let ip = forwarded
            .or_else(|| {
                req.extensions()
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip().to_string())
            })
            .unwrap_or_else(|| "unknown".to_string());

        Self {
            ip,
            user_agent: util::user_agent(req.headers()),
        }
    }

    /// Client info attached by the pipeline; a placeholder when absent.
    pub fn of(req: &Request) -> Self {
        req.extensions()
            .get::<ClientInfo>()
            .cloned()
            .unwrap_or_else(|| Self {
                ip: "unknown".to_string(),
                user_agent: None,
            })
    }

    pub fn origin(&self) -> Origin {
        Origin::new(Some(self.ip.clone()), self.user_agent.clone())
    }
}

pub struct Pipeline<S> {
    middleware: Vec<Arc<dyn Middleware>>,
    router: Router<S>,
    trust_proxy_headers: bool,
    debug: bool,
}

impl<S> Pipeline<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn new(router: Router<S>) -> Self {
        Self {
            middleware: Vec::new(),
            router,
            trust_proxy_headers: false,
            debug: false,
        }
    }

    /// Append a global middleware. The first one added is the outermost.
    pub fn layer(mut self, middleware: impl Middleware) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    pub fn trust_proxy_headers(mut self, trust: bool) -> Self {
        self.trust_proxy_headers = trust;
        self
    }

    /// Include internal error text in 500 responses.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub async fn handle(&self, mut req: Request) -> Response {
        let client = ClientInfo::from_request(&req, self.trust_proxy_headers);
        req.extensions_mut().insert(client);

        let response = Next::new(&self.middleware, &self.router).run(req).await;

        if self.debug {
            attach_debug_detail(response).await
        } else {
            response
        }
    }

    /// Mount the pipeline as the fallback of an axum router.
    pub fn into_axum(self) -> axum::Router {
        let pipeline = Arc::new(self);
        axum::Router::new().fallback(move |req: Request| {
            let pipeline = Arc::clone(&pipeline);
            async move { pipeline.handle(req).await }
        })
    }
}

async fn attach_debug_detail(response: Response) -> Response {
    let Some(ErrorDetail(detail)) = response.extensions().get::<ErrorDetail>().cloned() else {
        return response;
    };

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, MAX_BUFFERED_BODY).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!("Failed to buffer error body for debug output: {}", e);
            parts.headers.remove(header::CONTENT_LENGTH);
            return Response::from_parts(parts, Body::empty());
        }
    };

    let body = match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(mut map)) => {
            map.insert("debug".to_string(), Value::String(detail));
            let body = Value::Object(map).to_string();
            parts.headers.remove(header::CONTENT_LENGTH);
            parts
                .headers
                .insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
            Body::from(body)
        }
        _ => Body::from(bytes),
    };
    Response::from_parts(parts, body)
}
