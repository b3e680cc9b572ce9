use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};
use image::ImageFormat;

use crate::error::AppError;
use crate::middleware::ApiPath;
use crate::router::AppState;

/// GET /uploads/{file}
pub async fn serve_photo(
    State(state): State<AppState>,
    ApiPath(file): ApiPath<String>,
) -> Result<Response, AppError> {
    let bytes = state.birthdays.photos().read(&file).await?;
    let content_type = ImageFormat::from_path(&file)
        .map(|f| f.to_mime_type())
        .unwrap_or("application/octet-stream");
    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
            (header::CACHE_CONTROL, "private, max-age=3600"),
        ],
        bytes,
    )
        .into_response())
}
