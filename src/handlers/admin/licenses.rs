use axum::{
    extract::{FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::db::AppState;
use crate::engine::KeyFormat;
use crate::error::Result;
use crate::extractors::{Json, Query};
use crate::models::{License, LicenseFilter, LicenseStats, LicenseStatus};
use crate::pagination::{Paginated, clamp_limit, clamp_offset};
use crate::pipeline::{ClientInfo, RouteParams};

#[derive(Debug, Deserialize)]
pub struct ListLicensesQuery {
    pub status: Option<LicenseStatus>,
    /// Substring of the key, machine code or note
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateLicenseRequest {
    pub duration_days: i64,
    /// Use this key instead of generating one
    pub license_key: Option<String>,
    /// Key format for this license only
    pub format: Option<KeyFormat>,
}

#[derive(Debug, Deserialize)]
pub struct BatchCreateRequest {
    pub count: usize,
    pub duration_days: i64,
    pub format: Option<KeyFormat>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateLicenseRequest {
    pub machine_note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExtendRequest {
    pub days: i64,
}

#[derive(Debug, Serialize)]
pub struct BatchCreateResponse {
    pub count: usize,
    pub licenses: Vec<License>,
}

#[derive(Debug, Serialize)]
pub struct ReorderResponse {
    pub reordered: usize,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted: i64,
}

/// GET /admin/api/stats
pub async fn license_stats(
    state: AppState,
    _params: RouteParams,
    _req: Request,
) -> Result<Json<LicenseStats>> {
    Ok(Json(state.engine.stats()?))
}

/// GET /admin/api/licenses
/// Newest first, optionally filtered by status or a search term.
pub async fn list_licenses(
    state: AppState,
    _params: RouteParams,
    req: Request,
) -> Result<Json<Paginated<License>>> {
    let Query(query) = Query::<ListLicensesQuery>::from_uri(req.uri())?;
    let limit = clamp_limit(query.limit);
    let offset = clamp_offset(query.offset);
    let filter = LicenseFilter {
        status: query.status,
        search: query.search.filter(|s| !s.trim().is_empty()),
    };

    let page = state.engine.list(&filter, limit, offset)?;
    Ok(Json(Paginated::from_page(page, limit, offset)))
}

/// POST /admin/api/licenses
pub async fn create_license(
    state: AppState,
    _params: RouteParams,
    req: Request,
) -> Result<Response> {
    let origin = ClientInfo::of(&req).origin();
    let Json(body) = Json::<CreateLicenseRequest>::from_request(req, &()).await?;

    let license = state.engine.issue(
        body.duration_days,
        body.license_key.as_deref(),
        body.format.as_ref(),
        &origin,
    )?;
    Ok((StatusCode::CREATED, Json(license)).into_response())
}

/// POST /admin/api/licenses/batch
pub async fn create_license_batch(
    state: AppState,
    _params: RouteParams,
    req: Request,
) -> Result<Response> {
    let origin = ClientInfo::of(&req).origin();
    let Json(body) = Json::<BatchCreateRequest>::from_request(req, &()).await?;

    let licenses =
        state
            .engine
            .issue_batch(body.count, body.duration_days, body.format.as_ref(), &origin)?;
    let response = BatchCreateResponse {
        count: licenses.len(),
        licenses,
    };
    Ok((StatusCode::CREATED, Json(response)).into_response())
}

/// POST /admin/api/licenses/reorder-ids
pub async fn reorder_license_ids(
    state: AppState,
    _params: RouteParams,
    req: Request,
) -> Result<Json<ReorderResponse>> {
    let origin = ClientInfo::of(&req).origin();
    let reordered = state.engine.reorder_ids(&origin)?;
    Ok(Json(ReorderResponse { reordered }))
}

/// GET /admin/api/licenses/{id}
pub async fn get_license(
    state: AppState,
    params: RouteParams,
    _req: Request,
) -> Result<Json<License>> {
    let id: i64 = params.parse("id")?;
    Ok(Json(state.engine.get(id)?))
}

/// PUT /admin/api/licenses/{id}
/// Only the machine note is editable; an empty or missing note clears it.
pub async fn update_license(
    state: AppState,
    params: RouteParams,
    req: Request,
) -> Result<Json<License>> {
    let id: i64 = params.parse("id")?;
    let origin = ClientInfo::of(&req).origin();
    let Json(body) = Json::<UpdateLicenseRequest>::from_request(req, &()).await?;

    let license = state
        .engine
        .set_note(id, body.machine_note.as_deref(), &origin)?;
    Ok(Json(license))
}

/// DELETE /admin/api/licenses/{id}
pub async fn delete_license(
    state: AppState,
    params: RouteParams,
    req: Request,
) -> Result<Json<DeleteResponse>> {
    let id: i64 = params.parse("id")?;
    let origin = ClientInfo::of(&req).origin();
    state.engine.delete(id, &origin)?;
    Ok(Json(DeleteResponse { deleted: id }))
}

/// POST /admin/api/licenses/{id}/disable
pub async fn disable_license(
    state: AppState,
    params: RouteParams,
    req: Request,
) -> Result<Json<License>> {
    let id: i64 = params.parse("id")?;
    let origin = ClientInfo::of(&req).origin();
    Ok(Json(state.engine.disable(id, &origin)?))
}

/// POST /admin/api/licenses/{id}/enable
pub async fn enable_license(
    state: AppState,
    params: RouteParams,
    req: Request,
) -> Result<Json<License>> {
    let id: i64 = params.parse("id")?;
    let origin = ClientInfo::of(&req).origin();
    Ok(Json(state.engine.enable(id, &origin)?))
}

/// POST /admin/api/licenses/{id}/unbind
pub async fn unbind_license(
    state: AppState,
    params: RouteParams,
    req: Request,
) -> Result<Json<License>> {
    let id: i64 = params.parse("id")?;
    let origin = ClientInfo::of(&req).origin();
    Ok(Json(state.engine.unbind(id, &origin)?))
}

/// POST /admin/api/licenses/{id}/extend
pub async fn extend_license(
    state: AppState,
    params: RouteParams,
    req: Request,
) -> Result<Json<License>> {
    let id: i64 = params.parse("id")?;
    let origin = ClientInfo::of(&req).origin();
    let Json(body) = Json::<ExtendRequest>::from_request(req, &()).await?;
    Ok(Json(state.engine.extend(id, body.days, &origin)?))
}
