//! Job CRUD, toggle, status, and manual-trigger handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;
use validator::Validate;

use crate::dto::{CreateJobRequest, JobResponse, LogQuery, LogResponse, UpdateJobRequest};
use crate::error::HttpResult;
use crate::ApiContext;

pub async fn list_jobs(State(ctx): State<ApiContext>) -> HttpResult<Json<Vec<JobResponse>>> {
    Ok(Json(ctx.list_jobs().await?))
}

pub async fn create_job(
    State(ctx): State<ApiContext>,
    Json(request): Json<CreateJobRequest>,
) -> HttpResult<(StatusCode, Json<JobResponse>)> {
    request.validate()?;
    let job = ctx.create_job(request).await?;
    Ok((StatusCode::CREATED, Json(job)))
}

pub async fn get_job(
    State(ctx): State<ApiContext>,
    Path(id): Path<Uuid>,
) -> HttpResult<Json<JobResponse>> {
    Ok(Json(ctx.get_job(id).await?))
}

pub async fn update_job(
    State(ctx): State<ApiContext>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateJobRequest>,
) -> HttpResult<Json<JobResponse>> {
    request.validate()?;
    Ok(Json(ctx.update_job(id, request).await?))
}

pub async fn delete_job(
    State(ctx): State<ApiContext>,
    Path(id): Path<Uuid>,
) -> HttpResult<StatusCode> {
    ctx.delete_job(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn toggle_job(
    State(ctx): State<ApiContext>,
    Path(id): Path<Uuid>,
) -> HttpResult<Json<JobResponse>> {
    Ok(Json(ctx.toggle_job(id).await?))
}

pub async fn trigger_job(
    State(ctx): State<ApiContext>,
    Path(id): Path<Uuid>,
) -> HttpResult<(StatusCode, Json<LogResponse>)> {
    let log = ctx.trigger_job(id).await?;
    // The log is returned either way; a failed execution surfaces as 500
    let status = match log.status {
        cronhook_core::model::ExecutionStatus::Success => StatusCode::OK,
        cronhook_core::model::ExecutionStatus::Failed => StatusCode::INTERNAL_SERVER_ERROR,
    };
    Ok((status, Json(log)))
}

pub async fn job_logs(
    State(ctx): State<ApiContext>,
    Path(id): Path<Uuid>,
    Query(query): Query<LogQuery>,
) -> HttpResult<Json<crate::dto::PaginatedLogs>> {
    Ok(Json(ctx.job_logs(id, query).await?))
}
