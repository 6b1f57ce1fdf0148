//! Data export/import handlers.

use axum::extract::{Multipart, State};
use axum::Json;

use crate::dto::{ExportPayload, ImportSummary, ValidationReport};
use crate::error::{HttpError, HttpResult};
use crate::ApiContext;

pub async fn export_data(State(ctx): State<ApiContext>) -> HttpResult<Json<ExportPayload>> {
    Ok(Json(ctx.export_data().await?))
}

pub async fn import_data(
    State(ctx): State<ApiContext>,
    Json(payload): Json<ExportPayload>,
) -> HttpResult<Json<ImportSummary>> {
    Ok(Json(ctx.import_data(payload).await?))
}

/// Multipart variant: the first file field carries the JSON payload
pub async fn import_file(
    State(ctx): State<ApiContext>,
    mut multipart: Multipart,
) -> HttpResult<Json<ImportSummary>> {
    let field = multipart
        .next_field()
        .await
        .map_err(|err| HttpError::bad_request(format!("Malformed multipart body: {err}")))?
        .ok_or_else(|| HttpError::bad_request("Missing file field"))?;

    let bytes = field
        .bytes()
        .await
        .map_err(|err| HttpError::bad_request(format!("Could not read upload: {err}")))?;

    let payload: ExportPayload = serde_json::from_slice(&bytes)
        .map_err(|err| HttpError::bad_request(format!("Invalid export JSON: {err}")))?;

    Ok(Json(ctx.import_data(payload).await?))
}

pub async fn validate_data(
    State(ctx): State<ApiContext>,
    Json(payload): Json<ExportPayload>,
) -> HttpResult<Json<ValidationReport>> {
    Ok(Json(ctx.validate_payload(&payload)))
}
