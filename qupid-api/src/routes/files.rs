use axum::body::Body;
use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use diesel::prelude::*;
use serde::Serialize;
use std::sync::Arc;

use qupid_shared::errors::{AppError, AppResult, ErrorCode};
use qupid_shared::types::{ApiResponse, MessageBody};

use crate::extractors::CurrentUser;
use crate::schema::users;
use crate::services::uploads::{self, UploadKind};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub file_path: String,
    pub file_size: u64,
    pub original_filename: String,
    pub content_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::new(ErrorCode::PayloadTooLarge, "file is too large")
    } else {
        AppError::bad_request(format!("failed to read multipart: {e}"))
    }
}

// --- POST /files/upload/:kind ---

/// Accepts the `file` field (or the first field carrying a file name).
pub async fn upload(
    State(state): State<Arc<AppState>>,
    CurrentUser(me): CurrentUser,
    Path(kind): Path<String>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<ApiResponse<UploadResponse>>)> {
    let kind = UploadKind::parse(&kind)?;
    let max_bytes = state.config.max_upload_bytes;

    let mut field = loop {
        let field = multipart
            .next_field()
            .await
            .map_err(multipart_error)?
            .ok_or_else(|| AppError::bad_request("no file provided"))?;
        if field.name() == Some("file") || field.file_name().is_some() {
            break field;
        }
    };

    let original_filename = field.file_name().unwrap_or_default().to_string();
    let content_type = field.content_type().unwrap_or_default().to_string();
    let ext = uploads::validate_upload(kind, Some(&original_filename), Some(&content_type))?;

    let mut data = Vec::new();
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        data.extend_from_slice(&chunk);
        if data.len() > max_bytes {
            uploads::ensure_size(data.len(), max_bytes)?;
        }
    }
    uploads::ensure_size(data.len(), max_bytes)?;

    let stored = state.uploads.save(kind, me.id, &ext, &data).await?;

    let avatar_url = if kind == UploadKind::Avatar {
        let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
        diesel::update(users::table.find(me.id))
            .set((users::avatar_url.eq(&stored.file_path), users::updated_at.eq(Utc::now())))
            .execute(&mut conn)?;

        if let Some(old) = me.avatar_url.as_deref().filter(|old| uploads::is_owned_by(old, me.id)) {
            if let Err(e) = state.uploads.remove(old).await {
                tracing::warn!(user_id = %me.id, path = %old, error = %e, "failed to remove previous avatar");
            }
        }
        Some(stored.file_path.clone())
    } else {
        None
    };

    metrics::counter!("uploads_total", "kind" => kind.directory()).increment(1);
    tracing::info!(user_id = %me.id, path = %stored.file_path, size = stored.file_size, "file uploaded");

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(UploadResponse {
            file_path: stored.file_path,
            file_size: stored.file_size,
            original_filename,
            content_type,
            avatar_url,
        })),
    ))
}

// --- GET /files/download/*path ---

pub async fn download(
    State(state): State<Arc<AppState>>,
    CurrentUser(_me): CurrentUser,
    Path(path): Path<String>,
) -> AppResult<Response> {
    let bytes = state.uploads.read(&path).await?;
    let file_name = std::path::Path::new(&path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("download");

    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{file_name}\"")),
        ],
        Body::from(bytes),
    )
        .into_response())
}

// --- DELETE /files/*path ---

pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    CurrentUser(me): CurrentUser,
    Path(path): Path<String>,
) -> AppResult<Json<ApiResponse<MessageBody>>> {
    state.uploads.resolve(&path)?;
    if !uploads::is_owned_by(&path, me.id) {
        return Err(AppError::forbidden("you can only delete your own files"));
    }
    state.uploads.remove(&path).await?;

    tracing::info!(user_id = %me.id, path = %path, "file deleted");

    Ok(Json(ApiResponse::message("File deleted successfully")))
}
