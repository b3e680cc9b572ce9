use axum::{
    Json,
    extract::{Multipart, State},
    response::Response,
};
use chrono::Utc;

use super::{FormData, download, local_today};
use crate::error::AppError;
use crate::router::AppState;
use crate::service::transfer::{CsvPreview, ImportReport};

pub async fn export_zip(State(state): State<AppState>) -> Result<Response, AppError> {
    let bytes = state.transfer.export_zip().await?;
    Ok(download("application/zip", "zip", bytes))
}

/// Multipart: `file` (.zip) and optional `replace`.
pub async fn import_zip(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ImportReport>, AppError> {
    let mut form = FormData::read(multipart).await?;
    let file = form.require_file("zip", "ZIP")?;
    let report = state
        .transfer
        .import_zip(file.bytes, form.flag("replace"))
        .await?;
    Ok(Json(report))
}

pub async fn export_csv(State(state): State<AppState>) -> Result<Response, AppError> {
    let bytes = state.transfer.export_csv(local_today()).await?;
    Ok(download("text/csv; charset=utf-8", "csv", bytes))
}

pub async fn export_ics(State(state): State<AppState>) -> Result<Response, AppError> {
    let calendar = state.transfer.export_ics(Utc::now()).await?;
    Ok(download("text/calendar; charset=utf-8", "ics", calendar))
}

pub async fn preview_csv(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<CsvPreview>, AppError> {
    let mut form = FormData::read(multipart).await?;
    let file = form.require_file("csv", "CSV")?;
    Ok(Json(state.transfer.preview_csv(&file.bytes).await?))
}

/// Multipart: `file` (.csv), optional `replace` and `skip_duplicates`.
pub async fn import_csv(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ImportReport>, AppError> {
    let mut form = FormData::read(multipart).await?;
    let file = form.require_file("csv", "CSV")?;
    let report = state
        .transfer
        .import_csv(&file.bytes, form.flag("replace"), form.flag("skip_duplicates"))
        .await?;
    Ok(Json(report))
}
