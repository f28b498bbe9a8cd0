use std::sync::Arc;

use axum::{
    extract::Request,
    response::{IntoResponse, Response},
};
use futures::FutureExt;
use futures::future::BoxFuture;

use crate::clock::Clock;
use crate::crypto::{client_signature, secrets_match};
use crate::error::AppError;
use crate::pipeline::{ClientInfo, Middleware, Next};
use crate::util::header_value;

/// Allowed distance between the client's `Timestamp` header and server time.
pub const REPLAY_WINDOW_SECS: i64 = 300;

const CLIENT_ID_HEADERS: &[&str] = &["client-id", "x-client-id"];
const SIGNATURE_HEADERS: &[&str] = &["client-signature", "x-client-signature"];
const TIMESTAMP_HEADERS: &[&str] = &["timestamp", "x-timestamp"];

/// Decides whether a signature is acceptable for the given client and timestamp.
pub trait SignaturePolicy: Send + Sync {
    fn accepts(&self, client_id: &str, timestamp: &str, signature: &str) -> bool;
}

/// Any non-empty signature passes; only presence and the replay window are
/// enforced.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAnySignature;

impl SignaturePolicy for AcceptAnySignature {
    fn accepts(&self, _client_id: &str, _timestamp: &str, signature: &str) -> bool {
        !signature.is_empty()
    }
}

/// Lowercase hex HMAC-SHA256 of `"{client_id}.{timestamp}"`.
#[derive(Clone)]
pub struct HmacSignature {
    secret: String,
}

impl HmacSignature {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

impl SignaturePolicy for HmacSignature {
    fn accepts(&self, client_id: &str, timestamp: &str, signature: &str) -> bool {
        if self.secret.is_empty() {
            return false;
        }
        let expected = client_signature(&self.secret, client_id, timestamp);
        secrets_match(&expected, &signature.to_ascii_lowercase())
    }
}

/// Requires `Client-ID`, `Client-Signature` and `Timestamp` headers, with the
/// timestamp inside the replay window.
pub struct ClientAuth {
    clock: Arc<dyn Clock>,
    policy: Box<dyn SignaturePolicy>,
}

impl ClientAuth {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_policy(clock, AcceptAnySignature)
    }

    pub fn with_policy(clock: Arc<dyn Clock>, policy: impl SignaturePolicy + 'static) -> Self {
        Self {
            clock,
            policy: Box::new(policy),
        }
    }

    fn authenticate(&self, req: &Request) -> Result<(), AppError> {
        let headers = req.headers();
        let (Some(client_id), Some(signature), Some(timestamp)) = (
            header_value(headers, CLIENT_ID_HEADERS),
            header_value(headers, SIGNATURE_HEADERS),
            header_value(headers, TIMESTAMP_HEADERS),
        ) else {
            return Err(AppError::Unauthorized(
                "Missing client authentication headers".into(),
            ));
        };

        let sent_at: i64 = timestamp
            .parse()
            .map_err(|_| AppError::Unauthorized("Invalid timestamp".into()))?;
        if (self.clock.now() - sent_at).abs() > REPLAY_WINDOW_SECS {
            return Err(AppError::Unauthorized("Request timestamp expired".into()));
        }

        if !self.policy.accepts(client_id, timestamp, signature) {
            return Err(AppError::Unauthorized("Invalid client signature".into()));
        }
        Ok(())
    }
}

impl Middleware for ClientAuth {
    fn handle<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a, Response> {
        async move {
            if let Err(err) = self.authenticate(&req) {
                let client = ClientInfo::of(&req);
                tracing::warn!(
                    ip = %client.ip,
                    path = %req.uri().path(),
                    user_agent = client.user_agent.as_deref().unwrap_or("-"),
                    "Client authentication failed: {}",
                    err
                );
                return err.into_response();
            }
            next.run(req).await
        }
        .boxed()
    }
}
