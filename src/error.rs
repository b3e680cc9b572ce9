use axum::extract::multipart::MultipartError;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::{Json, http::StatusCode, response::IntoResponse};
use oauth2::basic::BasicErrorResponseType;
use oauth2::reqwest::Error as ReqwestClientError;
use oauth2::{HttpClientError, RequestTokenError, StandardErrorResponse};
use serde::Serialize;
use sqlx::Error as SqlxError;
use thiserror::Error as ThisError;
use tokio_cron_scheduler::JobSchedulerError;

use crate::logging::redact;
use crate::mail::MailError;

#[derive(Debug, ThisError)]
pub enum AppError {
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("HTTP request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] SqlxError),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Multipart error: {0}")]
    Multipart(#[from] MultipartError),

    #[error("Request rejected: {message}")]
    Rejected { status: StatusCode, message: String },

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] JobSchedulerError),

    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("{0}")]
    Validation(String),

    #[error("Birthday not found: {0}")]
    BirthdayNotFound(i64),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Invalid or missing access key")]
    Unauthorized,

    #[error("SMTP settings are not configured")]
    SettingsMissing,

    #[error("Google Client ID and Secret must be configured first")]
    OauthClientMissing,

    #[error(transparent)]
    Mail(#[from] MailError),

    #[error("OAuth2 token request error: {0}")]
    Oauth2Token(String),

    #[error("OAuth2 server error: {error}")]
    Oauth2Server {
        error: String,
        description: Option<String>,
    },

    #[error("Unexpected error: {0}")]
    UnexpectedError(String),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    /// Transport failures worth retrying; OAuth server rejections are final.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Reqwest(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            AppError::Oauth2Token(_) => true,
            _ => false,
        }
    }
}

impl
    From<
        RequestTokenError<
            HttpClientError<ReqwestClientError>,
            StandardErrorResponse<BasicErrorResponseType>,
        >,
    > for AppError
{
    fn from(
        e: RequestTokenError<
            HttpClientError<ReqwestClientError>,
            StandardErrorResponse<BasicErrorResponseType>,
        >,
    ) -> Self {
        match e {
            RequestTokenError::ServerResponse(err) => AppError::Oauth2Server {
                error: err.error().to_string(),
                description: err.error_description().cloned(),
            },
            RequestTokenError::Request(req_e) => {
                AppError::Oauth2Token(format!("request failed: {}", req_e))
            }
            RequestTokenError::Parse(parse_err, _body) => AppError::Json(parse_err.into_inner()),
            RequestTokenError::Other(s) => AppError::Oauth2Token(s),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Rejected {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_body) = match self {
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                ApiErrorBody::new("VALIDATION_ERROR", msg),
            ),
            AppError::Multipart(e) => (
                e.status(),
                ApiErrorBody::new("BAD_REQUEST", e.body_text()),
            ),
            AppError::Rejected { status, message } => {
                (status, ApiErrorBody::new("BAD_REQUEST", message))
            }
            AppError::Csv(e) => (
                StatusCode::BAD_REQUEST,
                ApiErrorBody::new("INVALID_CSV", format!("Could not read CSV file: {e}")),
            ),
            AppError::Zip(e) => (
                StatusCode::BAD_REQUEST,
                ApiErrorBody::new("INVALID_ARCHIVE", format!("Could not read ZIP file: {e}")),
            ),
            AppError::Image(_) => (
                StatusCode::BAD_REQUEST,
                ApiErrorBody::new("INVALID_IMAGE", "Uploaded photo is not a supported image."),
            ),
            AppError::BirthdayNotFound(_) => (
                StatusCode::NOT_FOUND,
                ApiErrorBody::new("NOT_FOUND", "Birthday not found"),
            ),
            AppError::FileNotFound(_) => (
                StatusCode::NOT_FOUND,
                ApiErrorBody::new("NOT_FOUND", "File not found"),
            ),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                ApiErrorBody::new("UNAUTHORIZED", "Invalid or missing access key"),
            ),
            AppError::SettingsMissing => (
                StatusCode::BAD_REQUEST,
                ApiErrorBody::new("SETTINGS_MISSING", "SMTP settings are not configured"),
            ),
            AppError::OauthClientMissing => (
                StatusCode::BAD_REQUEST,
                ApiErrorBody::new(
                    "OAUTH_CLIENT_MISSING",
                    "Google Client ID and Secret must be configured first. Please enter them in SMTP Settings.",
                ),
            ),
            AppError::Mail(mail_err) => {
                let (code, status, hint) = mail_err.classify();
                tracing::error!(error = %redact(&mail_err.to_string()), "mail delivery failed");
                (status, ApiErrorBody::new(code, hint))
            }
            AppError::Oauth2Server { error, description } => {
                let message = description.unwrap_or_else(|| error.clone());
                (
                    StatusCode::UNAUTHORIZED,
                    ApiErrorBody::new("OAUTH_FAILED", redact(&message)),
                )
            }
            upstream @ (AppError::Oauth2Token(_) | AppError::Reqwest(_) | AppError::UrlParse(_)) => {
                tracing::error!(error = %redact(&upstream.to_string()), "upstream failure");
                (
                    StatusCode::BAD_GATEWAY,
                    ApiErrorBody::new("BAD_GATEWAY", "Upstream service is unavailable."),
                )
            }
            other => {
                tracing::error!(error = %redact(&other.to_string()), "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiErrorBody::new("INTERNAL_ERROR", "An internal server error occurred."),
                )
            }
        };
        (status, Json(ApiErrorResponse { error: error_body })).into_response()
    }
}

/// Standardized API error response body
#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
}

impl ApiErrorBody {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorBody,
}
