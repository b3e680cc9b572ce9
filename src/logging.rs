use std::sync::LazyLock;

use regex::Regex;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;

const REDACTED: &str = "[REDACTED]";

static SECRET_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#"(?i)(smtp_?password|client_?secret|refresh_?token|access_?token)["']?\s*[:=]\s*["']?[^\s"',}]+"#,
        r"(?i)(password|passwd|pwd)\s*[:=]\s*\S+",
        r"(?i)(api[_-]?key|secret[_-]?key)\s*[:=]\s*\S+",
        r"(?i)\b(token)\s*[:=]\s*\S+",
        r"(?i)(bearer)\s+[a-zA-Z0-9_.=-]+",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// Install the global tracing subscriber. `RUST_LOG` wins over the configured level.
pub fn init_tracing(cfg: &LoggingConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cfg.level.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_target(false),
        )
        .init();
}

/// Replace credential-looking `key=value` pairs before a message reaches the logs.
pub fn redact(message: &str) -> String {
    SECRET_PATTERNS
        .iter()
        .fold(message.to_string(), |acc, re| {
            re.replace_all(&acc, format!("$1: {REDACTED}").as_str())
                .into_owned()
        })
}

#[cfg(test)]
mod tests {
    use super::redact;

    #[test]
    fn redacts_password_assignments() {
        let out = redact("login failed password=hunter2 for user");
        assert!(!out.contains("hunter2"));
        assert!(out.contains("[REDACTED]"));
    }

    #[test]
    fn redacts_oauth_material() {
        let out = redact(r#"{"client_secret": "abc123", "refresh_token": "1//xyz"}"#);
        assert!(!out.contains("abc123"));
        assert!(!out.contains("1//xyz"));
    }

    #[test]
    fn redacts_bearer_tokens() {
        let out = redact("Authorization: Bearer ya29.a0AfH6SM");
        assert!(!out.contains("ya29"));
    }

    #[test]
    fn leaves_plain_messages_alone() {
        let msg = "Failed to connect to smtp.example.com:587";
        assert_eq!(redact(msg), msg);
    }
}
