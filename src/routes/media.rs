use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::storage::{BlobKey, MediaKind};

/// GET /media/{*key} — uploaded images from the blob store
pub async fn serve(State(state): State<AppState>, Path(key): Path<String>) -> AppResult<Response> {
    let key = BlobKey::parse(&key).map_err(|_| AppError::NotFound)?;
    let data = state.blobs.get(&key).await?.ok_or(AppError::NotFound)?;

    let content_type = match MediaKind::sniff(&data) {
        Some(kind) => kind.mime().to_string(),
        None => mime_guess::from_path(key.as_str())
            .first_or_octet_stream()
            .as_ref()
            .to_string(),
    };

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "public, max-age=86400".to_string()),
        ],
        data,
    )
        .into_response())
}
