//! SQL DDL for the birthday and settings tables (SQLite).

/// SQLite schema with:
/// - `birthdays`: one row per person; `birthdate` is `YYYY-MM-DD`, `photo` a public `/uploads/..` path
/// - `smtp_settings`: singleton row pinned to `id = 1`
/// - index on `birthdate` for the ordered listing and month/day lookups
pub const SQLITE_INIT: &str = r#"
CREATE TABLE IF NOT EXISTS birthdays (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL CHECK (length(trim(name)) > 0),
    birthdate TEXT NOT NULL CHECK (birthdate GLOB '[0-9][0-9][0-9][0-9]-[0-1][0-9]-[0-3][0-9]'),
    photo TEXT NULL,
    gender TEXT NULL CHECK (gender IS NULL OR gender IN ('male', 'female')),
    created_at TEXT NOT NULL, -- RFC3339
    updated_at TEXT NOT NULL  -- RFC3339
);

CREATE INDEX IF NOT EXISTS idx_birthdays_birthdate ON birthdays(birthdate);

CREATE TABLE IF NOT EXISTS smtp_settings (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    server TEXT NOT NULL,
    port INTEGER NOT NULL CHECK (port BETWEEN 1 AND 65535),
    email TEXT NOT NULL,
    password TEXT NULL,
    recipient_email TEXT NOT NULL,
    google_client_id TEXT NULL,
    google_client_secret TEXT NULL,
    google_refresh_token TEXT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;
