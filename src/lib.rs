pub mod config;
pub mod db;
pub mod error;
pub mod google_oauth;
pub mod handlers;
pub mod logging;
pub mod mail;
pub mod middleware;
pub mod router;
pub mod service;
pub mod storage;
pub mod types;

pub use error::AppError;
pub use router::{AppState, app_router};
