use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::error::{AppError, AppResult};
use crate::project::uploads::resolve_media_path;
use crate::state::AppState;

/// Serve uploaded head images and attachments.
pub async fn serve(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> AppResult<Response> {
    let media_root = state.config.media_path();
    let file_path = resolve_media_path(&media_root, &path).ok_or(AppError::NotFound)?;

    match tokio::fs::metadata(&file_path).await {
        Ok(meta) if meta.is_file() => {}
        Ok(_) => return Err(AppError::NotFound),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(AppError::NotFound),
        Err(e) => return Err(e.into()),
    }
    let data = tokio::fs::read(&file_path).await?;

    let mime = mime_guess::from_path(&file_path).first_or_octet_stream();
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, mime.as_ref().to_string()),
            (header::CACHE_CONTROL, "public, max-age=3600".to_string()),
        ],
        data,
    )
        .into_response())
}
