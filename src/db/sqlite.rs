use crate::db::models::DbBirthday;
use crate::db::schema::SQLITE_INIT;
use crate::error::AppError;
use crate::types::{Birthday, NewBirthday, SmtpSettings};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;
use tracing::info;

pub type SqlitePool = Pool<Sqlite>;

const BIRTHDAY_COLUMNS: &str = "id, name, birthdate, photo, gender, created_at, updated_at";

/// Open (creating if needed) the database file and apply the schema.
pub async fn connect(path: &Path) -> Result<SqlitePool, AppError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let connect_opts = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(connect_opts)
        .await?;
    init_schema(&pool).await?;
    info!(path = %path.display(), "database ready");
    Ok(pool)
}

/// Execute the bundled DDL one statement at a time.
pub async fn init_schema(pool: &SqlitePool) -> Result<(), AppError> {
    for stmt in SQLITE_INIT.split(';') {
        let s = stmt.trim();
        if s.is_empty() {
            continue;
        }
        sqlx::query(s).execute(pool).await?;
    }
    Ok(())
}

/// Result of [`BirthdayStore::insert_batch`].
#[derive(Debug)]
pub struct BatchWrite {
    pub removed: Vec<Birthday>,
    pub ids: Vec<i64>,
}

#[derive(Clone)]
pub struct BirthdayStore {
    pool: SqlitePool,
}

impl BirthdayStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, entry: &NewBirthday, photo: Option<&str>) -> Result<Birthday, AppError> {
        let now = Utc::now();
        let row: DbBirthday = sqlx::query_as(&format!(
            "INSERT INTO birthdays (name, birthdate, photo, gender, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             RETURNING {BIRTHDAY_COLUMNS}"
        ))
        .bind(&entry.name)
        .bind(entry.birthdate)
        .bind(photo)
        .bind(entry.gender.map(|g| g.as_str()))
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    /// Insert a batch in a single transaction, clearing the table first when
    /// `replace` is set. Nothing is deleted unless every insert succeeds.
    pub async fn insert_batch(
        &self,
        rows: &[(NewBirthday, Option<String>)],
        replace: bool,
    ) -> Result<BatchWrite, AppError> {
        let mut tx = self.pool.begin().await?;
        let removed: Vec<DbBirthday> = if replace {
            sqlx::query_as(&format!("DELETE FROM birthdays RETURNING {BIRTHDAY_COLUMNS}"))
                .fetch_all(&mut *tx)
                .await?
        } else {
            Vec::new()
        };

        let mut ids = Vec::with_capacity(rows.len());
        let now = Utc::now();
        for (entry, photo) in rows {
            let rec: (i64,) = sqlx::query_as(
                "INSERT INTO birthdays (name, birthdate, photo, gender, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?)
                 RETURNING id",
            )
            .bind(&entry.name)
            .bind(entry.birthdate)
            .bind(photo.as_deref())
            .bind(entry.gender.map(|g| g.as_str()))
            .bind(now)
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;
            ids.push(rec.0);
        }

        tx.commit().await?;
        Ok(BatchWrite {
            removed: removed.into_iter().map(Into::into).collect(),
            ids,
        })
    }

    /// Overwrite every mutable column. `None` when the id does not exist.
    pub async fn update(
        &self,
        id: i64,
        entry: &NewBirthday,
        photo: Option<&str>,
    ) -> Result<Option<Birthday>, AppError> {
        let row: Option<DbBirthday> = sqlx::query_as(&format!(
            "UPDATE birthdays SET name = ?, birthdate = ?, photo = ?, gender = ?, updated_at = ?
             WHERE id = ?
             RETURNING {BIRTHDAY_COLUMNS}"
        ))
        .bind(&entry.name)
        .bind(entry.birthdate)
        .bind(photo)
        .bind(entry.gender.map(|g| g.as_str()))
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    /// Delete one row, returning what was removed.
    pub async fn delete(&self, id: i64) -> Result<Option<Birthday>, AppError> {
        let row: Option<DbBirthday> = sqlx::query_as(&format!(
            "DELETE FROM birthdays WHERE id = ? RETURNING {BIRTHDAY_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Birthday>, AppError> {
        let row: Option<DbBirthday> = sqlx::query_as(&format!(
            "SELECT {BIRTHDAY_COLUMNS} FROM birthdays WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    pub async fn list_all(&self) -> Result<Vec<Birthday>, AppError> {
        let rows: Vec<DbBirthday> = sqlx::query_as(&format!(
            "SELECT {BIRTHDAY_COLUMNS} FROM birthdays ORDER BY birthdate, name, id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Rows whose birthdate matches any of the given `MM-DD` keys.
    pub async fn list_by_month_day(&self, keys: &[String]) -> Result<Vec<Birthday>, AppError> {
        let mut out = Vec::new();
        for key in keys {
            let rows: Vec<DbBirthday> = sqlx::query_as(&format!(
                "SELECT {BIRTHDAY_COLUMNS} FROM birthdays
                 WHERE strftime('%m-%d', birthdate) = ?
                 ORDER BY name, id"
            ))
            .bind(key)
            .fetch_all(&self.pool)
            .await?;
            out.extend(rows.into_iter().map(Birthday::from));
        }
        Ok(out)
    }

    pub async fn count_photo_refs(&self, photo: &str) -> Result<i64, AppError> {
        let rec: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM birthdays WHERE photo = ?")
            .bind(photo)
            .fetch_one(&self.pool)
            .await?;
        Ok(rec.0)
    }
}

#[derive(Clone)]
pub struct SettingsStore {
    pool: SqlitePool,
}

impl SettingsStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn load(&self) -> Result<Option<SmtpSettings>, AppError> {
        let row = sqlx::query(
            r#"SELECT server, port, email, password, recipient_email,
               google_client_id, google_client_secret, google_refresh_token,
               created_at, updated_at
               FROM smtp_settings WHERE id = 1"#,
        )
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_model).transpose()
    }

    /// Upsert the singleton row.
    pub async fn save(&self, s: &SmtpSettings) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO smtp_settings (
                id, server, port, email, password, recipient_email,
                google_client_id, google_client_secret, google_refresh_token,
                created_at, updated_at
            ) VALUES (1, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                server=excluded.server,
                port=excluded.port,
                email=excluded.email,
                password=excluded.password,
                recipient_email=excluded.recipient_email,
                google_client_id=excluded.google_client_id,
                google_client_secret=excluded.google_client_secret,
                google_refresh_token=excluded.google_refresh_token,
                updated_at=excluded.updated_at
            "#,
        )
        .bind(&s.server)
        .bind(i64::from(s.port))
        .bind(&s.email)
        .bind(&s.password)
        .bind(&s.recipient_email)
        .bind(&s.google_client_id)
        .bind(&s.google_client_secret)
        .bind(&s.google_refresh_token)
        .bind(s.created_at)
        .bind(s.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Returns false when no settings row exists yet.
    pub async fn store_refresh_token(&self, token: &str) -> Result<bool, AppError> {
        let res = sqlx::query(
            "UPDATE smtp_settings SET google_refresh_token = ?, updated_at = ? WHERE id = 1",
        )
        .bind(token)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    pub async fn reset(&self) -> Result<(), AppError> {
        sqlx::query("DELETE FROM smtp_settings")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    fn row_to_model(row: SqliteRow) -> Result<SmtpSettings, AppError> {
        let port_i: i64 = row.try_get("port")?;
        let port = u16::try_from(port_i).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        let created_at: DateTime<Utc> = row.try_get("created_at")?;
        let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

        Ok(SmtpSettings {
            server: row.try_get("server")?,
            port,
            email: row.try_get("email")?,
            password: row.try_get("password")?,
            recipient_email: row.try_get("recipient_email")?,
            google_client_id: row.try_get("google_client_id")?,
            google_client_secret: row.try_get("google_client_secret")?,
            google_refresh_token: row.try_get("google_refresh_token")?,
            created_at,
            updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Gender;
    use chrono::NaiveDate;

    async fn memory_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        init_schema(&pool).await.unwrap();
        pool
    }

    fn entry(name: &str, date: &str) -> NewBirthday {
        NewBirthday::parse(name, date, Some("male")).unwrap()
    }

    #[tokio::test]
    async fn insert_and_get_round_trip() {
        let store = BirthdayStore::new(memory_pool().await);
        let created = store
            .insert(&entry("Test User", "1990-01-15"), Some("/uploads/a.png"))
            .await
            .unwrap();
        assert!(created.id > 0);

        let fetched = store.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "Test User");
        assert_eq!(fetched.birthdate, NaiveDate::from_ymd_opt(1990, 1, 15).unwrap());
        assert_eq!(fetched.gender, Some(Gender::Male));
        assert_eq!(fetched.photo.as_deref(), Some("/uploads/a.png"));
    }

    #[tokio::test]
    async fn check_constraints_reject_bad_rows() {
        let pool = memory_pool().await;
        let blank = sqlx::query(
            "INSERT INTO birthdays (name, birthdate, created_at, updated_at) VALUES ('  ', '1990-01-01', '', '')",
        )
        .execute(&pool)
        .await;
        assert!(blank.is_err());

        let bad_date = sqlx::query(
            "INSERT INTO birthdays (name, birthdate, created_at, updated_at) VALUES ('A', '01/02/1990', '', '')",
        )
        .execute(&pool)
        .await;
        assert!(bad_date.is_err());

        let bad_gender = sqlx::query(
            "INSERT INTO birthdays (name, birthdate, gender, created_at, updated_at) VALUES ('A', '1990-01-02', 'x', '', '')",
        )
        .execute(&pool)
        .await;
        assert!(bad_gender.is_err());
    }

    #[tokio::test]
    async fn update_and_delete_report_missing_rows() {
        let store = BirthdayStore::new(memory_pool().await);
        assert!(store.update(42, &entry("X", "2000-02-02"), None).await.unwrap().is_none());
        assert!(store.delete(42).await.unwrap().is_none());

        let b = store.insert(&entry("X", "2000-02-02"), None).await.unwrap();
        let updated = store
            .update(b.id, &entry("Y", "2001-03-03"), Some("/uploads/y.png"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.name, "Y");
        assert_eq!(updated.photo.as_deref(), Some("/uploads/y.png"));

        let removed = store.delete(b.id).await.unwrap().unwrap();
        assert_eq!(removed.name, "Y");
        assert!(store.get_by_id(b.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn month_day_lookup_and_photo_refs() {
        let store = BirthdayStore::new(memory_pool().await);
        store.insert(&entry("A", "1990-06-20"), Some("/uploads/p.png")).await.unwrap();
        store.insert(&entry("B", "1985-06-20"), Some("/uploads/p.png")).await.unwrap();
        store.insert(&entry("C", "1985-06-21"), None).await.unwrap();

        let hits = store.list_by_month_day(&["06-20".to_string()]).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(store.count_photo_refs("/uploads/p.png").await.unwrap(), 2);
        assert_eq!(store.count_photo_refs("/uploads/none.png").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn batch_insert_is_ordered_and_replaces() {
        let store = BirthdayStore::new(memory_pool().await);
        let first = store
            .insert_batch(&[(entry("A", "1990-01-01"), None), (entry("B", "1991-01-01"), None)], false)
            .await
            .unwrap();
        assert!(first.removed.is_empty());
        assert_eq!(first.ids.len(), 2);
        assert!(first.ids[0] < first.ids[1]);

        let second = store
            .insert_batch(&[(entry("C", "1992-01-01"), Some("/uploads/c.png".into()))], true)
            .await
            .unwrap();
        assert_eq!(second.removed.len(), 2);
        let all = store.list_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].photo.as_deref(), Some("/uploads/c.png"));
    }

    #[tokio::test]
    async fn failed_replace_keeps_existing_rows() {
        let store = BirthdayStore::new(memory_pool().await);
        store.insert(&entry("Kept", "1990-01-01"), None).await.unwrap();

        let blank = NewBirthday {
            name: "  ".into(),
            ..entry("x", "1991-01-01")
        };
        let result = store
            .insert_batch(&[(entry("New", "1992-01-01"), None), (blank, None)], true)
            .await;
        assert!(result.is_err());

        let all = store.list_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "Kept");
    }

    #[tokio::test]
    async fn settings_singleton_upsert_and_reset() {
        let store = SettingsStore::new(memory_pool().await);
        assert!(store.load().await.unwrap().is_none());
        assert!(!store.store_refresh_token("1//t").await.unwrap());

        let now = Utc::now();
        let mut s = SmtpSettings {
            server: "smtp.gmail.com".into(),
            port: 587,
            email: "me@gmail.com".into(),
            password: Some("pw".into()),
            recipient_email: "you@example.com".into(),
            google_client_id: None,
            google_client_secret: None,
            google_refresh_token: None,
            created_at: now,
            updated_at: now,
        };
        store.save(&s).await.unwrap();
        s.port = 465;
        store.save(&s).await.unwrap();

        assert!(store.store_refresh_token("1//t").await.unwrap());
        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.port, 465);
        assert_eq!(loaded.google_refresh_token.as_deref(), Some("1//t"));

        store.reset().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
    }
}
