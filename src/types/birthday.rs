use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;
use crate::service::calendar;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }

    /// Blank input means "not specified".
    pub fn parse_optional(raw: Option<&str>) -> Result<Option<Gender>, AppError> {
        match raw.map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => s.parse().map(Some),
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gender {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            other => Err(AppError::validation(format!(
                "Invalid gender '{other}'. Use 'male' or 'female'"
            ))),
        }
    }
}

/// A stored birthday record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Birthday {
    pub id: i64,
    pub name: String,
    #[serde(rename = "birthday")]
    pub birthdate: NaiveDate,
    pub photo: Option<String>,
    pub gender: Option<Gender>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Validated fields for creating or updating a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBirthday {
    pub name: String,
    pub birthdate: NaiveDate,
    pub gender: Option<Gender>,
}

impl NewBirthday {
    /// Trim and validate raw form input.
    pub fn parse(name: &str, birthdate: &str, gender: Option<&str>) -> Result<Self, AppError> {
        let name = name.trim();
        let birthdate = birthdate.trim();
        if name.is_empty() || birthdate.is_empty() {
            return Err(AppError::validation("Name and birthday are required"));
        }
        Ok(Self {
            name: collapse_whitespace(name),
            birthdate: calendar::parse_birthdate(birthdate)?,
            gender: Gender::parse_optional(gender)?,
        })
    }
}

/// How an update treats the stored photo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhotoChange {
    Keep,
    Remove,
    Replace(PhotoUpload),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhotoUpload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// API representation: the record plus values derived from "today".
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BirthdayView {
    #[serde(flatten)]
    pub birthday: Birthday,
    pub age: i32,
    pub days_until: u32,
}

impl BirthdayView {
    pub fn new(birthday: Birthday, today: NaiveDate) -> Self {
        let age = calendar::age_on(birthday.birthdate, today);
        let days_until = calendar::days_until(birthday.birthdate, today);
        Self {
            birthday,
            age,
            days_until,
        }
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_trims_and_validates() {
        let nb = NewBirthday::parse("  Ada   Lovelace ", " 1815-12-10 ", Some("female")).unwrap();
        assert_eq!(nb.name, "Ada Lovelace");
        assert_eq!(nb.birthdate, NaiveDate::from_ymd_opt(1815, 12, 10).unwrap());
        assert_eq!(nb.gender, Some(Gender::Female));
    }

    #[test]
    fn parse_rejects_missing_fields() {
        assert!(NewBirthday::parse("", "1990-01-15", None).is_err());
        assert!(NewBirthday::parse("Test", "  ", None).is_err());
        assert!(NewBirthday::parse("Test", "invalid-date", None).is_err());
    }

    #[test]
    fn blank_gender_is_unspecified() {
        assert_eq!(Gender::parse_optional(Some("  ")).unwrap(), None);
        assert_eq!(Gender::parse_optional(None).unwrap(), None);
        assert_eq!(Gender::parse_optional(Some("MALE")).unwrap(), Some(Gender::Male));
        assert!(Gender::parse_optional(Some("other")).is_err());
    }

    #[test]
    fn view_serializes_birthdate_as_birthday() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let b = Birthday {
            id: 7,
            name: "Test".into(),
            birthdate: NaiveDate::from_ymd_opt(1990, 3, 5).unwrap(),
            photo: None,
            gender: Some(Gender::Male),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let json = serde_json::to_value(BirthdayView::new(b, today)).unwrap();
        assert_eq!(json["birthday"], "1990-03-05");
        assert_eq!(json["gender"], "male");
        assert_eq!(json["age"], 33);
        assert_eq!(json["days_until"], 4);
    }
}
