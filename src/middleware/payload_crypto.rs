use axum::{
    body::{Body, to_bytes},
    extract::Request,
    http::{HeaderValue, header},
    response::Response,
};
use futures::FutureExt;
use futures::future::BoxFuture;

use crate::crypto::PayloadCipher;
use crate::pipeline::{ClientInfo, MAX_BUFFERED_BODY, Middleware, Next};
use crate::util::header_value;

const ENCRYPTED_DATA_HEADERS: &[&str] = &["encrypted-data", "x-encrypted-data"];

/// Opens an `Encrypted-Data` request payload into the body and seals the
/// response body.
///
/// Failures in either direction are logged and the message passes through
/// unchanged.
#[derive(Debug, Clone)]
pub struct PayloadCrypto {
    cipher: PayloadCipher,
}

impl PayloadCrypto {
    pub fn new(cipher: PayloadCipher) -> Self {
        Self { cipher }
    }

    fn open_request(&self, mut req: Request) -> Request {
        let Some(encoded) = header_value(req.headers(), ENCRYPTED_DATA_HEADERS) else {
            return req;
        };

        match self.cipher.decrypt(encoded) {
            Ok(plaintext) => {
                let headers = req.headers_mut();
                headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
                headers.remove(header::CONTENT_LENGTH);
                *req.body_mut() = Body::from(plaintext);
            }
            Err(e) => {
                let client = ClientInfo::of(&req);
                tracing::warn!(
                    ip = %client.ip,
                    path = %req.uri().path(),
                    "Failed to decrypt request payload, passing through: {}",
                    e
                );
            }
        }
        req
    }

    async fn seal_response(&self, response: Response) -> Response {
        let (mut parts, body) = response.into_parts();
        let bytes = match to_bytes(body, MAX_BUFFERED_BODY).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("Failed to buffer response for encryption: {}", e);
                parts.headers.remove(header::CONTENT_LENGTH);
                return Response::from_parts(parts, Body::empty());
            }
        };

        match self.cipher.encrypt(&bytes) {
            Ok(sealed) => {
                parts.headers.remove(header::CONTENT_LENGTH);
                parts
                    .headers
                    .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
                parts
                    .headers
                    .insert("encrypted-response", HeaderValue::from_static("true"));
                parts.headers.insert(
                    "encryption-method",
                    HeaderValue::from_static(self.cipher.method().name()),
                );
                Response::from_parts(parts, Body::from(sealed))
            }
            Err(e) => {
                tracing::warn!("Failed to encrypt response, sending plaintext: {}", e);
                Response::from_parts(parts, Body::from(bytes))
            }
        }
    }
}

impl Middleware for PayloadCrypto {
    fn handle<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a, Response> {
        async move {
            let req = self.open_request(req);
            let response = next.run(req).await;
            self.seal_response(response).await
        }
        .boxed()
    }
}
