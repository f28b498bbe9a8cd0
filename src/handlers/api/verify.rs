use axum::{
    extract::{FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::db::AppState;
use crate::engine::{VerifyFailure, VerifyResult, VerifySuccess};
use crate::error::{AppError, Result};
use crate::extractors::Json;
use crate::pipeline::{ClientInfo, RouteParams};

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    #[serde(default)]
    pub license_key: String,
    #[serde(default)]
    pub machine_code: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse<T> {
    pub success: bool,
    pub message: &'static str,
    pub data: T,
}

#[derive(Debug, Serialize)]
pub struct FailureData {
    pub status: VerifyFailure,
}

/// POST /api/verify
pub async fn verify_license(
    state: AppState,
    _params: RouteParams,
    req: Request,
) -> Result<Response> {
    let origin = ClientInfo::of(&req).origin();
    let Json(body) = Json::<VerifyRequest>::from_request(req, &()).await?;

    let license_key = body.license_key.trim();
    let machine_code = body.machine_code.trim();
    if license_key.is_empty() || machine_code.is_empty() {
        return Err(AppError::Validation(
            "license_key and machine_code are required".into(),
        ));
    }

    let result = state.engine.verify(license_key, machine_code, &origin)?;
    tracing::debug!(status = result.status_text(), "License verification");
    Ok(verify_response(result))
}

fn verify_response(result: VerifyResult) -> Response {
    match result {
        VerifyResult::Success(success) => success_response(success),
        VerifyResult::Failure(failure) => {
            let status = match failure {
                VerifyFailure::NotFound => StatusCode::NOT_FOUND,
                VerifyFailure::Disabled
                | VerifyFailure::Expired
                | VerifyFailure::MachineMismatch => StatusCode::FORBIDDEN,
            };
            let body = VerifyResponse {
                success: false,
                message: failure.message(),
                data: FailureData { status: failure },
            };
            (status, Json(body)).into_response()
        }
    }
}

fn success_response(success: VerifySuccess) -> Response {
    let body = VerifyResponse {
        success: true,
        message: success.message(),
        data: success,
    };
    (StatusCode::OK, Json(body)).into_response()
}
