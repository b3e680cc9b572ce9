pub mod auth;
pub mod extract;

pub use auth::RequireAccessKey;
pub use extract::{ApiJson, ApiPath, ApiQuery};
