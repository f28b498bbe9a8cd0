use axum::extract::Request;
use serde::Serialize;

use crate::db::AppState;
use crate::extractors::Json;
use crate::pipeline::RouteParams;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// GET /health
pub async fn health(_state: AppState, _params: RouteParams, _req: Request) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
