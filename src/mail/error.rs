use std::fmt;

use axum::http::StatusCode;
use lettre::transport::smtp;
use thiserror::Error as ThisError;

const APP_PASSWORD_HINT: &str = "Gmail requires an App Password or OAuth2. \
Use OAuth2 (recommended) or generate an App Password in Google Account settings.";

/// What we keep from a lettre SMTP error: enough to classify it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpFailure {
    pub code: Option<u16>,
    pub message: String,
    /// Connection, TLS or timeout problem rather than a server reply.
    pub transport: bool,
}

impl fmt::Display for SmtpFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{code} {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl From<&smtp::Error> for SmtpFailure {
    fn from(e: &smtp::Error) -> Self {
        let code = e.status().and_then(|c| c.to_string().parse::<u16>().ok());
        let transport = e.is_timeout() || e.is_tls() || (code.is_none() && !e.is_client());
        Self {
            code,
            message: e.to_string(),
            transport,
        }
    }
}

#[derive(Debug, ThisError)]
pub enum MailError {
    #[error("invalid email address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("could not build message: {0}")]
    Build(#[from] lettre::error::Error),

    #[error("invalid attachment: {0}")]
    Attachment(String),

    #[error("SMTP error: {0}")]
    Smtp(SmtpFailure),

    #[error("no SMTP password stored and Gmail OAuth2 is not connected")]
    NoCredentials,

    #[error("OAuth2 access token request failed: {0}")]
    OAuth(String),
}

impl From<smtp::Error> for MailError {
    fn from(e: smtp::Error) -> Self {
        MailError::Smtp(SmtpFailure::from(&e))
    }
}

impl MailError {
    /// Map to `(error code, HTTP status, user-facing hint)`.
    pub fn classify(&self) -> (&'static str, StatusCode, String) {
        match self {
            MailError::OAuth(_) => (
                "OAUTH_FAILED",
                StatusCode::UNAUTHORIZED,
                "OAuth2 authentication failed. Check your Client ID, Secret, and Refresh Token."
                    .to_string(),
            ),
            MailError::NoCredentials => (
                "SMTP_AUTH_FAILED",
                StatusCode::UNAUTHORIZED,
                "No SMTP password is stored. Enter one or connect Gmail OAuth2.".to_string(),
            ),
            MailError::Address(e) => (
                "VALIDATION_ERROR",
                StatusCode::BAD_REQUEST,
                format!("Invalid email address in SMTP settings: {e}"),
            ),
            MailError::Build(_) | MailError::Attachment(_) => (
                "INTERNAL_ERROR",
                StatusCode::INTERNAL_SERVER_ERROR,
                "Could not build the email message.".to_string(),
            ),
            MailError::Smtp(f) => classify_smtp(f),
        }
    }
}

fn classify_smtp(f: &SmtpFailure) -> (&'static str, StatusCode, String) {
    let needs_app_password = f.message.contains("Application-specific password required")
        || f.message.contains("InvalidSecondFactor");
    match f.code {
        Some(534) => ("SMTP_AUTH_FAILED", StatusCode::UNAUTHORIZED, APP_PASSWORD_HINT.to_string()),
        _ if needs_app_password => {
            ("SMTP_AUTH_FAILED", StatusCode::UNAUTHORIZED, APP_PASSWORD_HINT.to_string())
        }
        Some(530 | 535) => (
            "SMTP_AUTH_FAILED",
            StatusCode::UNAUTHORIZED,
            "SMTP authentication failed. Check your credentials.".to_string(),
        ),
        _ if f.transport => (
            "SMTP_CONNECTION_FAILED",
            StatusCode::BAD_GATEWAY,
            "Could not connect to the SMTP server. Check server and port.".to_string(),
        ),
        Some(550..=553) if refers_to_sender(&f.message) => (
            "SMTP_SENDER_REFUSED",
            StatusCode::BAD_REQUEST,
            "The SMTP server refused the sender address.".to_string(),
        ),
        Some(550..=553) => (
            "SMTP_RECIPIENT_REFUSED",
            StatusCode::BAD_REQUEST,
            "The SMTP server refused the recipient address.".to_string(),
        ),
        _ => ("SMTP_ERROR", StatusCode::BAD_GATEWAY, format!("SMTP error: {f}")),
    }
}

fn refers_to_sender(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("sender") || lower.contains("mail from")
}
