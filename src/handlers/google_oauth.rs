use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::error::AppError;
use crate::google_oauth::{DeviceCode, PollStatus};
use crate::logging::redact;
use crate::middleware::ApiJson;
use crate::router::AppState;
use crate::types::SmtpSettings;

async fn oauth_settings(state: &AppState) -> Result<SmtpSettings, AppError> {
    let settings = state
        .settings
        .load()
        .await?
        .ok_or(AppError::OauthClientMissing)?;
    if settings.oauth_client().is_none() {
        return Err(AppError::OauthClientMissing);
    }
    Ok(settings)
}

/// POST /api/oauth/device/init -> user code and verification URL for Gmail consent.
pub async fn device_init(State(state): State<AppState>) -> Result<Json<DeviceCode>, AppError> {
    let settings = oauth_settings(&state).await?;
    let (client_id, client_secret) = settings
        .oauth_client()
        .ok_or(AppError::OauthClientMissing)?;
    let code = state.oauth.device_init(client_id, client_secret).await?;
    info!(expires_in = code.expires_in, "device authorization started");
    Ok(Json(code))
}

#[derive(Debug, Deserialize)]
pub struct DevicePollRequest {
    #[serde(default)]
    pub device_code: String,
}

/// POST /api/oauth/device/poll -> one token poll; stores the refresh token on success.
pub async fn device_poll(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<DevicePollRequest>,
) -> Result<Response, AppError> {
    let device_code = req.device_code.trim();
    if device_code.is_empty() {
        return Err(AppError::validation("device_code is required"));
    }
    let settings = oauth_settings(&state).await?;
    let (client_id, client_secret) = settings
        .oauth_client()
        .ok_or(AppError::OauthClientMissing)?;

    let status = state
        .oauth
        .device_poll(client_id, client_secret, device_code)
        .await?;

    let response = match status {
        PollStatus::Pending => (
            StatusCode::OK,
            Json(json!({"status": "pending", "message": "Waiting for authorization..."})),
        ),
        PollStatus::SlowDown => (
            StatusCode::OK,
            Json(json!({"status": "slow_down", "message": "Please wait before polling again"})),
        ),
        PollStatus::Expired => (
            StatusCode::BAD_REQUEST,
            Json(json!({"status": "expired", "error": "Device code expired. Please start over."})),
        ),
        PollStatus::Denied(reason) => {
            let reason = redact(&reason);
            warn!(reason = %reason, "device authorization rejected");
            (
                StatusCode::BAD_REQUEST,
                Json(json!({"status": "error", "error": reason})),
            )
        }
        PollStatus::Authorized { refresh_token } => {
            if !state.settings.store_refresh_token(&refresh_token).await? {
                return Err(AppError::SettingsMissing);
            }
            info!("Gmail OAuth2 connected");
            (
                StatusCode::OK,
                Json(json!({"status": "success", "message": "Gmail OAuth2 connected successfully!"})),
            )
        }
    };
    Ok(response.into_response())
}
