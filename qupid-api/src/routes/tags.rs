use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use qupid_shared::errors::{AppError, AppResult, ErrorCode};
use qupid_shared::types::{ApiResponse, MessageBody, Paginated, PaginationParams};

use crate::extractors::{AdminUser, CurrentUser};
use crate::models::{NewTag, Tag};
use crate::schema::{tags, user_tags};
use crate::services::candidates::{escape_like, search_pattern};
use crate::AppState;

// --- Request DTOs ---

#[derive(Debug, Deserialize)]
pub struct TagSearch {
    pub search: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTagRequest {
    #[validate(length(min = 1, max = 64, message = "tag name must be 1-64 characters"))]
    pub name: String,
    #[validate(length(max = 255, message = "description must be at most 255 characters"))]
    pub description: Option<String>,
}

// --- Response DTOs ---

#[derive(Debug, Serialize)]
pub struct TagWithCount {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub user_count: i64,
}

impl TagWithCount {
    fn new(tag: Tag, user_count: i64) -> Self {
        Self {
            id: tag.id,
            name: tag.name,
            description: tag.description,
            created_at: tag.created_at,
            user_count,
        }
    }
}

fn user_counts(conn: &mut PgConnection, tag_ids: &[Uuid]) -> AppResult<HashMap<Uuid, i64>> {
    if tag_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows: Vec<(Uuid, i64)> = user_tags::table
        .filter(user_tags::tag_id.eq_any(tag_ids))
        .group_by(user_tags::tag_id)
        .select((user_tags::tag_id, diesel::dsl::count(user_tags::id)))
        .load(conn)?;
    Ok(rows.into_iter().collect())
}

// --- GET /tags ---

pub async fn list_tags(
    State(state): State<Arc<AppState>>,
    Query(search): Query<TagSearch>,
    Query(page): Query<PaginationParams>,
) -> AppResult<Json<ApiResponse<Paginated<TagWithCount>>>> {
    page.validate()?;
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let pattern = search.search.as_deref().filter(|s| !s.trim().is_empty()).map(search_pattern);

    let mut query = tags::table.into_boxed();
    let mut count_query = tags::table.into_boxed();
    if let Some(pattern) = &pattern {
        query = query.filter(tags::name.ilike(pattern.clone()));
        count_query = count_query.filter(tags::name.ilike(pattern.clone()));
    }

    let total = count_query.count().get_result::<i64>(&mut conn)?;
    let rows = query
        .order(tags::name.asc())
        .limit(page.limit)
        .offset(page.offset)
        .load::<Tag>(&mut conn)?;

    let ids: Vec<Uuid> = rows.iter().map(|t| t.id).collect();
    let counts = user_counts(&mut conn, &ids)?;
    let items = rows
        .into_iter()
        .map(|t| {
            let count = counts.get(&t.id).copied().unwrap_or(0);
            TagWithCount::new(t, count)
        })
        .collect();

    Ok(Json(ApiResponse::ok(Paginated::new(items, total, &page))))
}

// --- POST /tags ---

pub async fn create_tag(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<CreateTagRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<TagWithCount>>)> {
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))?;
    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(AppError::new(ErrorCode::ValidationError, "tag name cannot be blank"));
    }

    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let taken = tags::table
        .filter(tags::name.ilike(escape_like(&name)))
        .count()
        .get_result::<i64>(&mut conn)?
        > 0;
    if taken {
        return Err(AppError::new(ErrorCode::TagAlreadyExists, "tag already exists"));
    }

    let tag: Tag = diesel::insert_into(tags::table)
        .values(&NewTag { name, description: req.description })
        .get_result(&mut conn)
        .map_err(|e| match e {
            diesel::result::Error::DatabaseError(diesel::result::DatabaseErrorKind::UniqueViolation, _) => {
                AppError::new(ErrorCode::TagAlreadyExists, "tag already exists")
            }
            other => AppError::Database(other),
        })?;

    tracing::info!(user_id = %user.id, tag_id = %tag.id, name = %tag.name, "tag created");

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(TagWithCount::new(tag, 0)))))
}

// --- GET /tags/:id ---

pub async fn get_tag(
    State(state): State<Arc<AppState>>,
    Path(tag_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<TagWithCount>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let tag = tags::table
        .find(tag_id)
        .first::<Tag>(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::TagNotFound, "tag not found"))?;
    let count = user_counts(&mut conn, &[tag.id])?.get(&tag.id).copied().unwrap_or(0);

    Ok(Json(ApiResponse::ok(TagWithCount::new(tag, count))))
}

// --- DELETE /tags/:id ---

pub async fn delete_tag(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(tag_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<MessageBody>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let deleted = diesel::delete(tags::table.find(tag_id)).execute(&mut conn)?;
    if deleted == 0 {
        return Err(AppError::new(ErrorCode::TagNotFound, "tag not found"));
    }

    tracing::info!(admin_id = %admin.id, tag_id = %tag_id, "tag deleted");

    Ok(Json(ApiResponse::message("Tag deleted")))
}
