use axum::{Json, extract::State};
use serde::Deserialize;

use super::{MessageBody, local_today};
use crate::error::AppError;
use crate::middleware::{ApiJson, ApiQuery};
use crate::router::AppState;
use crate::service::reminders::{DigestOutcome, DigestPreview, DispatchReport};

const MAX_DIGEST_DAYS: u32 = 365;

fn digest_window(days: Option<u32>, fallback: u32) -> Result<u32, AppError> {
    let days = days.unwrap_or(fallback);
    if !(1..=MAX_DIGEST_DAYS).contains(&days) {
        return Err(AppError::validation("Days must be between 1 and 365"));
    }
    Ok(days)
}

pub async fn send_test_email(State(state): State<AppState>) -> Result<Json<MessageBody>, AppError> {
    state.reminders.send_test().await?;
    Ok(Json(MessageBody::new("Test email sent successfully!")))
}

/// Sends today's reminders immediately, outside the cron schedule.
pub async fn send_test_reminder(
    State(state): State<AppState>,
) -> Result<Json<DispatchReport>, AppError> {
    Ok(Json(state.reminders.send_today(local_today()).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct DigestParams {
    pub days: Option<u32>,
}

pub async fn preview_digest(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<DigestParams>,
) -> Result<Json<DigestPreview>, AppError> {
    let days = digest_window(params.days, state.digest_days)?;
    Ok(Json(state.reminders.preview_digest(local_today(), days).await?))
}

pub async fn send_digest(
    State(state): State<AppState>,
    body: Option<ApiJson<DigestParams>>,
) -> Result<Json<DigestOutcome>, AppError> {
    let requested = body.and_then(|ApiJson(p)| p.days);
    let days = digest_window(requested, state.digest_days)?;
    Ok(Json(state.reminders.send_digest(local_today(), days).await?))
}
