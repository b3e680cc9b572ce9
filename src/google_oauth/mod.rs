//! Google OAuth2 for Gmail SMTP: device authorization and token refresh.

pub mod endpoints;
pub mod service;

pub use endpoints::{DeviceCode, PollStatus};
pub use service::GoogleOauthService;
