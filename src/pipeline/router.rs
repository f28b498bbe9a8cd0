//! First-match router over `{param}` path patterns with middleware groups.

use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::Request,
    http::Method,
    response::{IntoResponse, Response},
};
use futures::FutureExt;
use futures::future::BoxFuture;

use super::{Endpoint, Middleware, Next};
use crate::error::AppError;

/// Type-erased handler. Takes owned values so the returned future is `'static`.
type ErasedHandler<S> =
    Arc<dyn Fn(S, RouteParams, Request) -> BoxFuture<'static, Response> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// Compiled path pattern such as `/licenses/{id}/extend`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn parse(pattern: &str) -> Self {
        let segments = split_path(pattern)
            .map(|segment| {
                match segment
                    .strip_prefix('{')
                    .and_then(|rest| rest.strip_suffix('}'))
                {
                    Some(name) => Segment::Param(name.to_string()),
                    None => Segment::Literal(segment.to_string()),
                }
            })
            .collect();
        Self { segments }
    }

    /// Match `path`, returning captured parameters in pattern order.
    pub fn matches(&self, path: &str) -> Option<RouteParams> {
        let parts: Vec<&str> = split_path(path).collect();
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut params = RouteParams::default();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(literal) if literal == part => {}
                Segment::Literal(_) => return None,
                Segment::Param(_) if part.is_empty() => return None,
                Segment::Param(name) => params.values.push((name.clone(), part.to_string())),
            }
        }
        Some(params)
    }
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.trim_matches('/')
        .split('/')
        .filter(|segment| !segment.is_empty())
}

/// Parameters captured from the request path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteParams {
    values: Vec<(String, String)>,
}

impl RouteParams {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Positional access, in the order the parameters appear in the pattern.
    pub fn nth(&self, index: usize) -> Option<&str> {
        self.values.get(index).map(|(_, value)| value.as_str())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Parse a named parameter, reporting a validation error when it is
    /// missing or malformed.
    pub fn parse<T: FromStr>(&self, name: &str) -> Result<T, AppError> {
        self.get(name)
            .and_then(|value| value.parse().ok())
            .ok_or_else(|| AppError::Validation(format!("Invalid path parameter: {}", name)))
    }
}

struct Route<S> {
    method: Method,
    pattern: PathPattern,
    middleware: Vec<Arc<dyn Middleware>>,
    handler: ErasedHandler<S>,
}

/// Maps (method, path) to a handler. Routes are tried in registration order
/// and the first match wins.
pub struct Router<S> {
    state: S,
    routes: Vec<Route<S>>,
    prefix: String,
    middleware: Vec<Arc<dyn Middleware>>,
}

impl<S> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn new(state: S) -> Self {
        Self {
            state,
            routes: Vec::new(),
            prefix: String::new(),
            middleware: Vec::new(),
        }
    }

    /// Register a handler. Inside a [`group`](Self::group) the group prefix
    /// and middleware apply.
    pub fn route<F, Fut, R>(mut self, method: Method, path: &str, handler: F) -> Self
    where
        F: Fn(S, RouteParams, Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoResponse + 'static,
    {
        let handler: ErasedHandler<S> =
            Arc::new(move |state: S, params: RouteParams, req: Request| {
                handler(state, params, req)
                    .map(IntoResponse::into_response)
                    .boxed()
            });
        self.routes.push(Route {
            method,
            pattern: PathPattern::parse(&join_path(&self.prefix, path)),
            middleware: self.middleware.clone(),
            handler,
        });
        self
    }

    pub fn get<F, Fut, R>(self, path: &str, handler: F) -> Self
    where
        F: Fn(S, RouteParams, Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoResponse + 'static,
    {
        self.route(Method::GET, path, handler)
    }

    pub fn post<F, Fut, R>(self, path: &str, handler: F) -> Self
    where
        F: Fn(S, RouteParams, Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoResponse + 'static,
    {
        self.route(Method::POST, path, handler)
    }

    pub fn put<F, Fut, R>(self, path: &str, handler: F) -> Self
    where
        F: Fn(S, RouteParams, Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoResponse + 'static,
    {
        self.route(Method::PUT, path, handler)
    }

    pub fn delete<F, Fut, R>(self, path: &str, handler: F) -> Self
    where
        F: Fn(S, RouteParams, Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoResponse + 'static,
    {
        self.route(Method::DELETE, path, handler)
    }

    /// Register routes under `prefix` wrapped by `middleware`. Groups nest:
    /// prefixes concatenate and outer middleware runs first.
    pub fn group<F>(
        mut self,
        prefix: &str,
        middleware: Vec<Arc<dyn Middleware>>,
        build: F,
    ) -> Self
    where
        F: FnOnce(Self) -> Self,
    {
        let outer_prefix = std::mem::take(&mut self.prefix);
        let outer_middleware = self.middleware.clone();

        self.prefix = join_path(&outer_prefix, prefix);
        self.middleware.extend(middleware);

        let mut router = build(self);
        router.prefix = outer_prefix;
        router.middleware = outer_middleware;
        router
    }

    /// Run the first matching route through its group middleware.
    pub async fn dispatch(&self, req: Request) -> Response {
        let path = req.uri().path().to_string();
        let method = req.method().clone();

        let mut allowed: Vec<&Method> = Vec::new();
        for route in &self.routes {
            let Some(params) = route.pattern.matches(&path) else {
                continue;
            };
            if route.method != method {
                if !allowed.contains(&&route.method) {
                    allowed.push(&route.method);
                }
                continue;
            }

            let endpoint = HandlerEndpoint {
                handler: &route.handler,
                state: &self.state,
                params,
            };
            return Next::new(&route.middleware, &endpoint).run(req).await;
        }

        if allowed.is_empty() {
            AppError::NotFound(format!("No route for {}", path)).into_response()
        } else {
            let allow = allowed
                .iter()
                .map(|m| m.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            AppError::MethodNotAllowed(allow).into_response()
        }
    }
}

impl<S> Endpoint for Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn call(&self, req: Request) -> BoxFuture<'_, Response> {
        self.dispatch(req).boxed()
    }
}

struct HandlerEndpoint<'r, S> {
    handler: &'r ErasedHandler<S>,
    state: &'r S,
    params: RouteParams,
}

impl<S> Endpoint for HandlerEndpoint<'_, S>
where
    S: Clone + Send + Sync + 'static,
{
    fn call(&self, req: Request) -> BoxFuture<'_, Response> {
        (self.handler)(self.state.clone(), self.params.clone(), req)
    }
}

fn join_path(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    match (prefix.is_empty(), path.is_empty()) {
        (true, true) => "/".to_string(),
        (true, false) => format!("/{}", path),
        (false, true) => prefix.to_string(),
        (false, false) => format!("{}/{}", prefix, path),
    }
}
