use crate::config::GoogleConfig;
use crate::error::AppError;

use oauth2::{
    AuthType, Client as OAuth2Client, ClientId, ClientSecret, DeviceAuthorizationUrl,
    EndpointNotSet, EndpointSet, RefreshToken, Scope, StandardDeviceAuthorizationResponse,
    StandardRevocableToken, TokenResponse, TokenUrl,
    basic::{
        BasicErrorResponse, BasicRevocationErrorResponse, BasicTokenIntrospectionResponse,
        BasicTokenResponse,
    },
};
use serde::{Deserialize, Serialize};
use tracing::info;

pub(super) const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// Stateless Google OAuth endpoints.
pub(super) struct GoogleOauthEndpoints;

impl GoogleOauthEndpoints {
    /// Start the device flow for the Gmail SMTP scope.
    pub(super) async fn request_device_code(
        cfg: &GoogleConfig,
        client_id: &str,
        client_secret: &str,
        http_client: &reqwest::Client,
    ) -> Result<DeviceCode, AppError> {
        let client = build_oauth2_client(cfg, client_id, client_secret)?;
        let details: StandardDeviceAuthorizationResponse = client
            .exchange_device_code()
            .add_scope(Scope::new(cfg.scope.clone()))
            .request_async(http_client)
            .await?;
        info!("device authorization started");
        Ok(DeviceCode {
            device_code: details.device_code().secret().clone(),
            user_code: details.user_code().secret().clone(),
            verification_url: details.verification_uri().to_string(),
            interval: details.interval().as_secs(),
            expires_in: details.expires_in().as_secs(),
        })
    }

    /// One poll of the token endpoint. Google answers pending/slow_down as
    /// HTTP 428/400 error bodies, so the exchange is read by hand.
    pub(super) async fn poll_device_token(
        cfg: &GoogleConfig,
        client_id: &str,
        client_secret: &str,
        device_code: &str,
        http_client: &reqwest::Client,
    ) -> Result<PollStatus, AppError> {
        let resp = http_client
            .post(cfg.token_url.as_str())
            .header("Accept", "application/json")
            .form(&[
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("device_code", device_code),
                ("grant_type", DEVICE_CODE_GRANT),
            ])
            .send()
            .await?;
        let status = resp.status();
        let body: DeviceTokenBody = resp.json().await?;
        body.into_status(status.is_success())
    }

    /// Exchange the stored refresh token for a short-lived access token.
    pub(super) async fn refresh_access_token(
        cfg: &GoogleConfig,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
        http_client: &reqwest::Client,
    ) -> Result<String, AppError> {
        let client = build_oauth2_client(cfg, client_id, client_secret)?;
        let token: BasicTokenResponse = client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(http_client)
            .await?;
        info!("access token refreshed");
        Ok(token.access_token().secret().clone())
    }
}

/// Build the Google OAuth2 client; credentials go in the request body.
fn build_oauth2_client(
    cfg: &GoogleConfig,
    client_id: &str,
    client_secret: &str,
) -> Result<GoogleOauth2Client, AppError> {
    let client = OAuth2Client::new(ClientId::new(client_id.to_string()))
        .set_client_secret(ClientSecret::new(client_secret.to_string()))
        .set_auth_type(AuthType::RequestBody)
        .set_device_authorization_url(DeviceAuthorizationUrl::new(cfg.device_code_url.clone())?)
        .set_token_uri(TokenUrl::new(cfg.token_url.clone())?);
    Ok(client)
}

/// Returned to the UI so the user can approve on another device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceCode {
    pub device_code: String,
    pub user_code: String,
    pub verification_url: String,
    pub interval: u64,
    pub expires_in: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus {
    Pending,
    SlowDown,
    Expired,
    Denied(String),
    Authorized { refresh_token: String },
}

#[derive(Debug, Deserialize)]
pub(super) struct DeviceTokenBody {
    refresh_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl DeviceTokenBody {
    pub(super) fn into_status(self, http_ok: bool) -> Result<PollStatus, AppError> {
        if let Some(error) = self.error {
            return Ok(match error.as_str() {
                "authorization_pending" => PollStatus::Pending,
                "slow_down" => PollStatus::SlowDown,
                "expired_token" => PollStatus::Expired,
                _ => PollStatus::Denied(self.error_description.unwrap_or(error)),
            });
        }
        match self.refresh_token.filter(|t| !t.is_empty()) {
            Some(refresh_token) if http_ok => Ok(PollStatus::Authorized { refresh_token }),
            Some(_) => Err(AppError::Oauth2Token("unexpected token response status".into())),
            None => Err(AppError::Oauth2Token(
                "No refresh token in response".to_string(),
            )),
        }
    }
}

pub(super) type GoogleOauth2Client = OAuth2Client<
    BasicErrorResponse,
    BasicTokenResponse,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
    EndpointNotSet,
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;

#[cfg(test)]
mod tests {
    use super::*;

    fn body(json: &str) -> DeviceTokenBody {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn maps_pending_states() {
        let pending = body(r#"{"error":"authorization_pending"}"#).into_status(false).unwrap();
        assert_eq!(pending, PollStatus::Pending);
        let slow = body(r#"{"error":"slow_down"}"#).into_status(false).unwrap();
        assert_eq!(slow, PollStatus::SlowDown);
        let expired = body(r#"{"error":"expired_token"}"#).into_status(false).unwrap();
        assert_eq!(expired, PollStatus::Expired);
    }

    #[test]
    fn denial_prefers_description() {
        let denied = body(r#"{"error":"access_denied","error_description":"User said no"}"#)
            .into_status(false)
            .unwrap();
        assert_eq!(denied, PollStatus::Denied("User said no".into()));
        let bare = body(r#"{"error":"invalid_grant"}"#).into_status(false).unwrap();
        assert_eq!(bare, PollStatus::Denied("invalid_grant".into()));
    }

    #[test]
    fn success_requires_refresh_token() {
        let ok = body(r#"{"access_token":"ya29","refresh_token":"1//r","expires_in":3599}"#)
            .into_status(true)
            .unwrap();
        assert_eq!(
            ok,
            PollStatus::Authorized {
                refresh_token: "1//r".into()
            }
        );
        assert!(body(r#"{"access_token":"ya29"}"#).into_status(true).is_err());
    }

    #[test]
    fn client_builds_from_default_config() {
        assert!(build_oauth2_client(&GoogleConfig::default(), "id", "secret").is_ok());
    }
}
