use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::AppError;

/// Stored SMTP relay settings (the `smtp_settings` singleton).
#[derive(Debug, Clone, PartialEq)]
pub struct SmtpSettings {
    pub server: String,
    pub port: u16,
    pub email: String,
    pub password: Option<String>,
    pub recipient_email: String,
    pub google_client_id: Option<String>,
    pub google_client_secret: Option<String>,
    pub google_refresh_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SmtpSettings {
    pub fn is_gmail(&self) -> bool {
        self.server.to_ascii_lowercase().contains("gmail.com")
    }

    /// Gmail with a complete OAuth client and a refresh token authenticates via XOAUTH2.
    pub fn should_use_oauth2(&self) -> bool {
        self.is_gmail()
            && has_value(&self.google_client_id)
            && has_value(&self.google_client_secret)
            && has_value(&self.google_refresh_token)
    }

    pub fn oauth_client(&self) -> Option<(&str, &str)> {
        match (&self.google_client_id, &self.google_client_secret) {
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => {
                Some((id.as_str(), secret.as_str()))
            }
            _ => None,
        }
    }

    /// Apply an update on top of the stored row; blank secrets keep the stored value.
    pub fn merge(existing: Option<&SmtpSettings>, input: SmtpSettingsInput) -> Result<Self, AppError> {
        let now = Utc::now();
        let keep = |incoming: Option<String>, stored: Option<&Option<String>>| {
            non_blank(incoming).or_else(|| stored.cloned().flatten())
        };
        let merged = SmtpSettings {
            server: input.smtp_server.trim().to_string(),
            port: input.smtp_port,
            email: input.smtp_email.trim().to_string(),
            password: keep(input.smtp_password, existing.map(|e| &e.password)),
            recipient_email: input.recipient_email.trim().to_string(),
            google_client_id: non_blank(input.google_client_id),
            google_client_secret: keep(
                input.google_client_secret,
                existing.map(|e| &e.google_client_secret),
            ),
            google_refresh_token: existing.and_then(|e| e.google_refresh_token.clone()),
            created_at: existing.map(|e| e.created_at).unwrap_or(now),
            updated_at: now,
        };
        merged.validate()?;
        Ok(merged)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        for (field, value) in [
            ("smtpServer", &self.server),
            ("smtpEmail", &self.email),
            ("recipientEmail", &self.recipient_email),
        ] {
            if value.is_empty() {
                return Err(AppError::validation(format!("Missing required field: {field}")));
            }
        }
        if self.port == 0 {
            return Err(AppError::validation("SMTP port must be between 1 and 65535"));
        }
        for (field, value) in [("smtpEmail", &self.email), ("recipientEmail", &self.recipient_email)] {
            if !looks_like_email(value) {
                return Err(AppError::validation(format!("Invalid email format for {field}")));
            }
        }
        if !has_value(&self.password) && !(self.is_gmail() && self.oauth_client().is_some()) {
            return Err(AppError::validation("Missing required field: smtpPassword"));
        }
        Ok(())
    }
}

/// Body of `POST /api/config`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmtpSettingsInput {
    #[serde(default)]
    pub smtp_server: String,
    #[serde(default, deserialize_with = "port_from_number_or_string")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_email: String,
    #[serde(default)]
    pub smtp_password: Option<String>,
    #[serde(default)]
    pub recipient_email: String,
    #[serde(default)]
    pub google_client_id: Option<String>,
    #[serde(default)]
    pub google_client_secret: Option<String>,
}

/// What `GET /api/config` exposes: no password, secret or refresh token.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicSettings {
    pub smtp_server: String,
    pub smtp_port: u16,
    pub smtp_email: String,
    pub recipient_email: String,
    pub google_client_id: Option<String>,
    pub has_password: bool,
    pub has_client_secret: bool,
    pub oauth_connected: bool,
    pub auth_method: &'static str,
}

impl From<&SmtpSettings> for PublicSettings {
    fn from(s: &SmtpSettings) -> Self {
        Self {
            smtp_server: s.server.clone(),
            smtp_port: s.port,
            smtp_email: s.email.clone(),
            recipient_email: s.recipient_email.clone(),
            google_client_id: s.google_client_id.clone(),
            has_password: has_value(&s.password),
            has_client_secret: has_value(&s.google_client_secret),
            oauth_connected: has_value(&s.google_refresh_token),
            auth_method: if s.should_use_oauth2() {
                "oauth2"
            } else {
                "password"
            },
        }
    }
}

fn has_value(v: &Option<String>) -> bool {
    v.as_deref().is_some_and(|s| !s.is_empty())
}

fn non_blank(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn looks_like_email(addr: &str) -> bool {
    match addr.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.'),
        None => false,
    }
}

fn port_from_number_or_string<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Number(u64),
        Text(String),
    }

    let invalid = || serde::de::Error::custom("SMTP port must be between 1 and 65535");
    let raw = match Port::deserialize(deserializer)? {
        Port::Number(n) => n,
        Port::Text(s) => s.trim().parse::<u64>().map_err(|_| invalid())?,
    };
    match u16::try_from(raw) {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn input(v: serde_json::Value) -> SmtpSettingsInput {
        serde_json::from_value(v).unwrap()
    }

    fn base() -> serde_json::Value {
        json!({
            "smtpServer": "smtp.example.com",
            "smtpPort": "587",
            "smtpEmail": "me@example.com",
            "smtpPassword": "app-pass",
            "recipientEmail": "you@example.org"
        })
    }

    #[test]
    fn accepts_string_or_numeric_port() {
        assert_eq!(input(base()).smtp_port, 587);
        let mut v = base();
        v["smtpPort"] = json!(465);
        assert_eq!(input(v).smtp_port, 465);
    }

    #[test]
    fn rejects_out_of_range_port() {
        let mut v = base();
        v["smtpPort"] = json!(70000);
        assert!(serde_json::from_value::<SmtpSettingsInput>(v).is_err());
    }

    #[test]
    fn merge_validates_fields() {
        let ok = SmtpSettings::merge(None, input(base())).unwrap();
        assert_eq!(ok.password.as_deref(), Some("app-pass"));

        let mut v = base();
        v["recipientEmail"] = json!("not-an-email");
        assert!(SmtpSettings::merge(None, input(v)).is_err());

        let mut v = base();
        v["smtpPassword"] = json!("");
        assert!(SmtpSettings::merge(None, input(v)).is_err());
    }

    #[test]
    fn blank_secrets_keep_stored_values() {
        let stored = SmtpSettings::merge(None, input(base())).unwrap();
        let mut v = base();
        v["smtpPassword"] = json!("");
        let merged = SmtpSettings::merge(Some(&stored), input(v)).unwrap();
        assert_eq!(merged.password.as_deref(), Some("app-pass"));
        assert_eq!(merged.created_at, stored.created_at);
    }

    #[test]
    fn gmail_oauth_client_is_enough_without_password() {
        let v = json!({
            "smtpServer": "smtp.gmail.com",
            "smtpPort": 587,
            "smtpEmail": "me@gmail.com",
            "recipientEmail": "you@example.org",
            "googleClientId": "id.apps.googleusercontent.com",
            "googleClientSecret": "shh"
        });
        let s = SmtpSettings::merge(None, input(v)).unwrap();
        assert!(!s.should_use_oauth2(), "no refresh token yet");

        let connected = SmtpSettings {
            google_refresh_token: Some("1//token".into()),
            ..s
        };
        assert!(connected.should_use_oauth2());
        let public = PublicSettings::from(&connected);
        assert_eq!(public.auth_method, "oauth2");
        assert!(public.oauth_connected);
    }

    #[test]
    fn public_view_never_contains_secrets() {
        let s = SmtpSettings::merge(None, input(base())).unwrap();
        let json = serde_json::to_string(&PublicSettings::from(&s)).unwrap();
        assert!(!json.contains("app-pass"));
        assert!(json.contains("\"hasPassword\":true"));
    }
}
