//! Extractors that return `AppError` (and so JSON error bodies) on failure.

use axum::{
    body::to_bytes,
    extract::{FromRequest, Request},
    http::Uri,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::AppError;

/// Request bodies larger than this are rejected.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

/// JSON body extractor and response.
///
/// Unlike `axum::Json` it does not insist on a `Content-Type` header: the
/// payload decryption stage hands over plain bytes, and older clients post
/// JSON without declaring it.
#[derive(Debug, Clone, Copy, Default)]
pub struct Json<T>(pub T);

impl<S, T> FromRequest<S> for Json<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = AppError;

    async fn from_request(req: Request, _state: &S) -> Result<Self, Self::Rejection> {
        let bytes = to_bytes(req.into_body(), MAX_BODY_BYTES)
            .await
            .map_err(|e| AppError::Validation(format!("Failed to read request body: {}", e)))?;
        let value = serde_json::from_slice(&bytes)?;
        Ok(Json(value))
    }
}

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        axum::Json(self.0).into_response()
    }
}

impl<T> std::ops::Deref for Json<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Query string extractor.
#[derive(Debug, Clone, Copy, Default)]
pub struct Query<T>(pub T);

impl<T: DeserializeOwned> Query<T> {
    pub fn from_uri(uri: &Uri) -> Result<Self, AppError> {
        axum::extract::Query::<T>::try_from_uri(uri)
            .map(|axum::extract::Query(value)| Query(value))
            .map_err(|e| AppError::Validation(e.body_text()))
    }
}

impl<T> std::ops::Deref for Query<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
