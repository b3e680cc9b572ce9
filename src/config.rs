//! Runtime configuration.
//!
//! Sources, later ones overriding earlier ones:
//! 1. `Config::default()`
//! 2. `config.toml` (or the path passed with `--config`)
//! 3. Environment variables prefixed with `BIRTHDAY_`, nested with `__`
//!    (e.g. `BIRTHDAY_BASIC__LISTEN_ADDR=0.0.0.0:5000`)

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DATABASE_FILE_NAME: &str = "birthdays.db";
const HOME_DIR_NAME: &str = ".birthday_reminder";
const PORTABLE_DIR_NAME: &str = "data";

pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
pub const GOOGLE_DEVICE_CODE_URI: &str = "https://oauth2.googleapis.com/device/code";
pub const GOOGLE_MAIL_SCOPE: &str = "https://mail.google.com/";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub basic: BasicConfig,
    pub logging: LoggingConfig,
    pub reminders: ReminderConfig,
    pub google: GoogleConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BasicConfig {
    pub listen_addr: SocketAddr,
    /// Keep all data next to the binary (`./data`) instead of the home directory.
    pub portable: bool,
    pub data_dir: Option<PathBuf>,
    pub database_path: Option<PathBuf>,
    pub uploads_dir: Option<PathBuf>,
    /// When set, `/api/*` and `/uploads/*` require this key.
    pub access_key: Option<String>,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReminderConfig {
    pub enabled: bool,
    /// Six-field cron expression (sec min hour dom mon dow), local time.
    pub cron: String,
    pub digest_enabled: bool,
    pub digest_cron: String,
    pub digest_days: u32,
    /// Outbound mail pacing for batch sends.
    pub per_minute: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleConfig {
    pub token_url: String,
    pub device_code_url: String,
    pub scope: String,
}

impl Default for BasicConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 5000)),
            portable: false,
            data_dir: None,
            database_path: None,
            uploads_dir: None,
            access_key: None,
            max_upload_bytes: 16 * 1024 * 1024,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cron: "0 0 8 * * *".to_string(),
            digest_enabled: false,
            digest_cron: "0 0 8 * * Mon".to_string(),
            digest_days: 7,
            per_minute: 30,
        }
    }
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            token_url: GOOGLE_TOKEN_URI.to_string(),
            device_code_url: GOOGLE_DEVICE_CODE_URI.to_string(),
            scope: GOOGLE_MAIL_SCOPE.to_string(),
        }
    }
}

impl Config {
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, AppError> {
        let config_file = config_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("BIRTHDAY_").split("__"))
            .extract()
            .map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.reminders.digest_days == 0 || self.reminders.digest_days > 365 {
            return Err(AppError::validation(
                "reminders.digest_days must be between 1 and 365",
            ));
        }
        if self.reminders.per_minute == 0 {
            return Err(AppError::validation(
                "reminders.per_minute must be greater than 0",
            ));
        }
        if self
            .basic
            .access_key
            .as_deref()
            .is_some_and(|k| k.trim().is_empty())
        {
            return Err(AppError::validation("basic.access_key must not be blank"));
        }
        Ok(())
    }

    /// Root directory holding the database and uploads.
    pub fn data_dir(&self) -> PathBuf {
        if let Some(dir) = self.basic.data_dir.clone() {
            return dir;
        }
        if self.basic.portable {
            return PathBuf::from(PORTABLE_DIR_NAME);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(HOME_DIR_NAME)
    }

    pub fn database_path(&self) -> PathBuf {
        self.basic
            .database_path
            .clone()
            .unwrap_or_else(|| self.data_dir().join(DATABASE_FILE_NAME))
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.basic
            .uploads_dir
            .clone()
            .unwrap_or_else(|| self.data_dir().join("uploads"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.basic.listen_addr.port(), 5000);
        assert_eq!(cfg.basic.max_upload_bytes, 16 * 1024 * 1024);
    }

    #[test]
    fn portable_mode_keeps_data_local() {
        let mut cfg = Config::default();
        cfg.basic.portable = true;
        assert_eq!(cfg.data_dir(), PathBuf::from("data"));
        assert_eq!(cfg.database_path(), PathBuf::from("data").join(DATABASE_FILE_NAME));
        assert_eq!(cfg.uploads_dir(), PathBuf::from("data").join("uploads"));
    }

    #[test]
    fn explicit_paths_win() {
        let mut cfg = Config::default();
        cfg.basic.data_dir = Some(PathBuf::from("/srv/bday"));
        cfg.basic.uploads_dir = Some(PathBuf::from("/var/photos"));
        assert_eq!(cfg.database_path(), PathBuf::from("/srv/bday/birthdays.db"));
        assert_eq!(cfg.uploads_dir(), PathBuf::from("/var/photos"));
    }

    #[test]
    fn rejects_out_of_range_digest_window() {
        let mut cfg = Config::default();
        cfg.reminders.digest_days = 0;
        assert!(cfg.validate().is_err());
        cfg.reminders.digest_days = 400;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_blank_access_key() {
        let mut cfg = Config::default();
        cfg.basic.access_key = Some("   ".to_string());
        assert!(cfg.validate().is_err());
    }
}
