//! Cross-job log search, statistics, and operator cleanup handlers.

use axum::extract::{Query, State};
use axum::Json;
use serde_json::json;

use crate::dto::{PaginatedLogs, SearchQuery, StatsQuery, StatsResponse, SweepRequest};
use crate::error::HttpResult;
use crate::ApiContext;

pub async fn search_logs(
    State(ctx): State<ApiContext>,
    Query(query): Query<SearchQuery>,
) -> HttpResult<Json<PaginatedLogs>> {
    Ok(Json(ctx.search_logs(query).await?))
}

pub async fn log_stats(
    State(ctx): State<ApiContext>,
    Query(query): Query<StatsQuery>,
) -> HttpResult<Json<StatsResponse>> {
    Ok(Json(ctx.log_stats(query).await?))
}

/// Operator-facing manual retention sweep
pub async fn cleanup_logs(
    State(ctx): State<ApiContext>,
    Json(request): Json<SweepRequest>,
) -> HttpResult<Json<serde_json::Value>> {
    let deleted = ctx.sweep_logs(request.retention_days).await?;
    Ok(Json(json!({ "deleted": deleted })))
}
