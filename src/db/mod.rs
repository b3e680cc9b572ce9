//! SQLite persistence for birthdays and the SMTP settings row.
//!
//! - `schema.rs`: DDL applied on every start
//! - `models.rs`: `FromRow` structs and their domain conversions
//! - `sqlite.rs`: pool setup plus `BirthdayStore` / `SettingsStore`

pub mod models;
pub mod schema;
pub mod sqlite;

pub use models::DbBirthday;
pub use schema::SQLITE_INIT;
pub use sqlite::{BatchWrite, BirthdayStore, SettingsStore, SqlitePool, connect, init_schema};
