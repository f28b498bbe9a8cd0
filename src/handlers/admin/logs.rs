use axum::extract::{FromRequest, Request};
use serde::{Deserialize, Serialize};

use crate::db::AppState;
use crate::error::Result;
use crate::extractors::{Json, Query};
use crate::models::{AdminLog, UsageLog, UsageLogQuery};
use crate::pagination::{Paginated, PaginationQuery, clamp_limit, clamp_offset};
use crate::pipeline::{ClientInfo, RouteParams};

#[derive(Debug, Deserialize)]
pub struct PurgeLogsRequest {
    /// Keep usage logs from the last N days (0 keeps everything)
    #[serde(default)]
    pub usage_older_than_days: i64,
    /// Keep admin logs from the last N days (0 keeps everything)
    #[serde(default)]
    pub admin_older_than_days: i64,
}

#[derive(Debug, Serialize)]
pub struct PurgeLogsResponse {
    pub usage_deleted: usize,
    pub admin_deleted: usize,
}

/// GET /admin/api/logs/usage
pub async fn list_usage_logs(
    state: AppState,
    _params: RouteParams,
    req: Request,
) -> Result<Json<Paginated<UsageLog>>> {
    let Query(query) = Query::<UsageLogQuery>::from_uri(req.uri())?;
    let limit = clamp_limit(query.limit);
    let offset = clamp_offset(query.offset);
    let license_key = query.license_key.as_deref().filter(|k| !k.is_empty());

    let page = state.engine.usage_logs(license_key, limit, offset)?;
    Ok(Json(Paginated::from_page(page, limit, offset)))
}

/// GET /admin/api/logs/admin
pub async fn list_admin_logs(
    state: AppState,
    _params: RouteParams,
    req: Request,
) -> Result<Json<Paginated<AdminLog>>> {
    let Query(query) = Query::<PaginationQuery>::from_uri(req.uri())?;
    let (limit, offset) = (query.limit(), query.offset());

    let page = state.engine.admin_logs(limit, offset)?;
    Ok(Json(Paginated::from_page(page, limit, offset)))
}

/// POST /admin/api/logs/purge
pub async fn purge_logs(
    state: AppState,
    _params: RouteParams,
    req: Request,
) -> Result<Json<PurgeLogsResponse>> {
    let origin = ClientInfo::of(&req).origin();
    let Json(body) = Json::<PurgeLogsRequest>::from_request(req, &()).await?;

    let (usage_deleted, admin_deleted) = state.engine.purge_logs(
        body.usage_older_than_days,
        body.admin_older_than_days,
        &origin,
    )?;
    Ok(Json(PurgeLogsResponse {
        usage_deleted,
        admin_deleted,
    }))
}
