use super::endpoints::{DeviceCode, GoogleOauthEndpoints, PollStatus};
use crate::config::GoogleConfig;
use crate::error::AppError;
use crate::logging::redact;
use backon::{ExponentialBuilder, Retryable};
use std::time::Duration;
use tracing::warn;

fn default_retry_policy() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_secs(1))
        .with_max_delay(Duration::from_secs(3))
        .with_max_times(3)
        .with_jitter()
}

/// Service layer composing the Google OAuth calls used for Gmail SMTP.
#[derive(Clone)]
pub struct GoogleOauthService {
    cfg: GoogleConfig,
    client: reqwest::Client,
}

impl GoogleOauthService {
    /// Create a new service with a preconfigured HTTP client.
    pub fn new(cfg: GoogleConfig) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("birthday-reminder/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { cfg, client })
    }

    pub async fn device_init(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> Result<DeviceCode, AppError> {
        GoogleOauthEndpoints::request_device_code(&self.cfg, client_id, client_secret, &self.client)
            .await
    }

    /// Single poll; the caller drives the interval.
    pub async fn device_poll(
        &self,
        client_id: &str,
        client_secret: &str,
        device_code: &str,
    ) -> Result<PollStatus, AppError> {
        GoogleOauthEndpoints::poll_device_token(
            &self.cfg,
            client_id,
            client_secret,
            device_code,
            &self.client,
        )
        .await
    }

    /// Fetch an access token with network-aware retries.
    pub async fn access_token(
        &self,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
    ) -> Result<String, AppError> {
        (|| {
            let (cfg, http) = (&self.cfg, &self.client);
            async move {
                GoogleOauthEndpoints::refresh_access_token(
                    cfg,
                    client_id,
                    client_secret,
                    refresh_token,
                    http,
                )
                .await
            }
        })
        .retry(default_retry_policy())
        .when(|e: &AppError| e.is_retryable())
        .notify(|err, dur: Duration| {
            warn!(
                "token refresh retrying after error {}, sleeping {:?}",
                redact(&err.to_string()),
                dur
            );
        })
        .await
    }
}
