use axum::{Json, extract::State};
use serde_json::{Value, json};
use tracing::info;

use super::MessageBody;
use crate::error::AppError;
use crate::middleware::ApiJson;
use crate::router::AppState;
use crate::types::{PublicSettings, SmtpSettings, SmtpSettingsInput};

/// Stored settings without secrets; `{}` when nothing is saved yet.
pub async fn get_config(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let body = match state.settings.load().await? {
        Some(s) => serde_json::to_value(PublicSettings::from(&s))?,
        None => json!({}),
    };
    Ok(Json(body))
}

pub async fn save_config(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<SmtpSettingsInput>,
) -> Result<Json<MessageBody>, AppError> {
    let existing = state.settings.load().await?;
    let merged = SmtpSettings::merge(existing.as_ref(), input)?;
    state.settings.save(&merged).await?;
    info!(server = %merged.server, port = merged.port, "SMTP settings saved");
    Ok(Json(MessageBody::new("Configuration saved successfully!")))
}

pub async fn reset_config(State(state): State<AppState>) -> Result<Json<MessageBody>, AppError> {
    state.settings.reset().await?;
    info!("SMTP settings reset");
    Ok(Json(MessageBody::new("Configuration reset successfully!")))
}
