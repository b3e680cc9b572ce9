use axum::{
    Json,
    extract::{Multipart, State},
};
use serde::{Deserialize, Serialize};

use super::{FormData, MessageBody, local_today};
use crate::error::AppError;
use crate::middleware::{ApiPath, ApiQuery};
use crate::router::AppState;
use crate::service::calendar::WeekdayGroups;
use crate::types::{Birthday, BirthdayView, NewBirthday, PhotoChange, PhotoUpload};

const UPCOMING_WINDOW_DAYS: u32 = 30;

pub async fn list_birthdays(
    State(state): State<AppState>,
) -> Result<Json<Vec<BirthdayView>>, AppError> {
    Ok(Json(state.birthdays.list(local_today()).await?))
}

pub async fn todays_birthdays(
    State(state): State<AppState>,
) -> Result<Json<Vec<BirthdayView>>, AppError> {
    Ok(Json(state.birthdays.today(local_today()).await?))
}

/// Next 30 days grouped by weekday.
pub async fn upcoming_birthdays(
    State(state): State<AppState>,
) -> Result<Json<WeekdayGroups>, AppError> {
    Ok(Json(
        state
            .birthdays
            .upcoming_by_weekday(local_today(), UPCOMING_WINDOW_DAYS)
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct DuplicateQuery {
    #[serde(default)]
    pub name: String,
    pub exclude_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct DuplicateMatches {
    pub duplicates: Vec<Birthday>,
    pub count: usize,
}

pub async fn find_duplicates(
    State(state): State<AppState>,
    ApiQuery(q): ApiQuery<DuplicateQuery>,
) -> Result<Json<DuplicateMatches>, AppError> {
    let duplicates = state.birthdays.find_duplicates(&q.name, q.exclude_id).await?;
    Ok(Json(DuplicateMatches {
        count: duplicates.len(),
        duplicates,
    }))
}

pub async fn get_birthday(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<BirthdayView>, AppError> {
    Ok(Json(state.birthdays.get(id, local_today()).await?))
}

fn entry_from(form: &FormData) -> Result<NewBirthday, AppError> {
    NewBirthday::parse(
        form.text("name").unwrap_or_default(),
        form.text("birthday").unwrap_or_default(),
        form.text("gender"),
    )
}

fn photo_from(form: &mut FormData) -> Option<PhotoUpload> {
    form.take_file("photo").map(|f| PhotoUpload {
        filename: f.filename,
        bytes: f.bytes,
    })
}

pub async fn create_birthday(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<MessageBody>, AppError> {
    let mut form = FormData::read(multipart).await?;
    let entry = entry_from(&form)?;
    let created = state.birthdays.create(entry, photo_from(&mut form)).await?;
    Ok(Json(MessageBody {
        message: "Birthday added successfully!".to_string(),
        id: Some(created.id),
    }))
}

/// A new photo wins over `remove_photo`; neither keeps the stored one.
pub async fn update_birthday(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    multipart: Multipart,
) -> Result<Json<MessageBody>, AppError> {
    let mut form = FormData::read(multipart).await?;
    let entry = entry_from(&form)?;
    let change = match photo_from(&mut form) {
        Some(upload) => PhotoChange::Replace(upload),
        None if form.flag("remove_photo") => PhotoChange::Remove,
        None => PhotoChange::Keep,
    };
    state.birthdays.update(id, entry, change).await?;
    Ok(Json(MessageBody::new("Birthday updated successfully!")))
}

pub async fn delete_birthday(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<MessageBody>, AppError> {
    state.birthdays.delete(id).await?;
    Ok(Json(MessageBody::new("Birthday deleted successfully!")))
}
