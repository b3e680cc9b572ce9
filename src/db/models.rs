use crate::types::{Birthday, Gender};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct DbBirthday {
    pub id: i64,
    pub name: String,
    pub birthdate: NaiveDate,
    pub photo: Option<String>,
    pub gender: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DbBirthday> for Birthday {
    fn from(d: DbBirthday) -> Self {
        Birthday {
            id: d.id,
            name: d.name,
            birthdate: d.birthdate,
            photo: d.photo,
            // CHECK constraint keeps this to male/female
            gender: d.gender.as_deref().and_then(|g| g.parse::<Gender>().ok()),
            created_at: d.created_at,
            updated_at: d.updated_at,
        }
    }
}
