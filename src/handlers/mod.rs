//! axum handlers; each is a thin adapter over a service.

pub mod birthdays;
pub mod google_oauth;
pub mod reminders;
pub mod settings;
pub mod transfer;
pub mod uploads;

use std::collections::HashMap;

use axum::extract::Multipart;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use chrono::{Local, NaiveDate};
use serde::Serialize;

use crate::error::AppError;

pub(crate) fn local_today() -> NaiveDate {
    Local::now().date_naive()
}

/// `{"message": ...}` plus optional extra fields.
#[derive(Debug, Serialize)]
pub struct MessageBody {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
}

impl MessageBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            id: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn has_extension(&self, ext: &str) -> bool {
        self.filename
            .rsplit_once('.')
            .is_some_and(|(_, e)| e.eq_ignore_ascii_case(ext))
    }
}

/// A fully buffered multipart form. File parts with an empty file name are
/// treated as "no file selected".
#[derive(Debug, Default)]
pub struct FormData {
    text: HashMap<String, String>,
    files: HashMap<String, UploadedFile>,
}

impl FormData {
    pub async fn read(mut multipart: Multipart) -> Result<Self, AppError> {
        let mut form = FormData::default();
        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_owned) else {
                continue;
            };
            match field.file_name().map(str::to_owned) {
                Some(filename) => {
                    let bytes = field.bytes().await?;
                    if !filename.is_empty() && !bytes.is_empty() {
                        form.files.insert(
                            name,
                            UploadedFile {
                                filename,
                                bytes: bytes.to_vec(),
                            },
                        );
                    }
                }
                None => {
                    let value = field.text().await?;
                    form.text.insert(name, value);
                }
            }
        }
        Ok(form)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.text.get(name).map(String::as_str)
    }

    /// HTML-form truthiness: `true`, `1`, `on`, `yes`.
    pub fn flag(&self, name: &str) -> bool {
        self.text(name).is_some_and(|v| {
            matches!(
                v.trim().to_ascii_lowercase().as_str(),
                "true" | "1" | "on" | "yes"
            )
        })
    }

    pub fn take_file(&mut self, name: &str) -> Option<UploadedFile> {
        self.files.remove(name)
    }

    /// The `file` part, required to carry the given extension.
    pub fn require_file(&mut self, ext: &str, kind: &str) -> Result<UploadedFile, AppError> {
        let file = self
            .take_file("file")
            .ok_or_else(|| AppError::validation("No file provided"))?;
        if !file.has_extension(ext) {
            return Err(AppError::validation(format!("File must be a {kind} file")));
        }
        Ok(file)
    }
}

/// `Content-Disposition: attachment` download named `birthdays_export_<stamp>.<ext>`.
pub(crate) fn download(content_type: &'static str, ext: &str, body: impl Into<axum::body::Body>) -> Response {
    let filename = format!(
        "birthdays_export_{}.{ext}",
        Local::now().format("%Y%m%d_%H%M%S")
    );
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body.into(),
    )
        .into_response()
}
