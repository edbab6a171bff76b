use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use qupid_shared::errors::{AppError, AppResult, ErrorCode};
use qupid_shared::types::{ApiResponse, MessageBody, Paginated, PaginationParams};

use crate::extractors::CurrentUser;
use crate::models::{NewSkip, Skip};
use crate::schema::skips;
use crate::services::relations;
use crate::services::views::{project_user, PublicUser};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SkipRequest {
    pub skipped_user_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct SkipEntry {
    pub id: Uuid,
    pub user: PublicUser,
    pub created_at: DateTime<Utc>,
}

// --- POST /skips ---

pub async fn skip_user(
    State(state): State<Arc<AppState>>,
    CurrentUser(me): CurrentUser,
    Json(req): Json<SkipRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Skip>>)> {
    if req.skipped_user_id == me.id {
        return Err(AppError::new(ErrorCode::CannotSkipSelf, "cannot skip yourself"));
    }

    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    let target = relations::find_active_user(&mut conn, req.skipped_user_id)?;

    let skip = diesel::insert_into(skips::table)
        .values(&NewSkip { skipper_id: me.id, skipped_id: target.id })
        .on_conflict((skips::skipper_id, skips::skipped_id))
        .do_nothing()
        .get_result::<Skip>(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::AlreadySkipped, "you have already skipped this user"))?;

    tracing::info!(user_id = %me.id, target_id = %target.id, "user skipped");

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(skip))))
}

// --- GET /skips ---

pub async fn list_skips(
    State(state): State<Arc<AppState>>,
    CurrentUser(me): CurrentUser,
    Query(page): Query<PaginationParams>,
) -> AppResult<Json<ApiResponse<Paginated<SkipEntry>>>> {
    page.validate()?;
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let total = skips::table
        .filter(skips::skipper_id.eq(me.id))
        .count()
        .get_result::<i64>(&mut conn)?;
    let rows = skips::table
        .filter(skips::skipper_id.eq(me.id))
        .order(skips::created_at.desc())
        .limit(page.limit)
        .offset(page.offset)
        .load::<Skip>(&mut conn)?;

    let ids: Vec<Uuid> = rows.iter().map(|s| s.skipped_id).collect();
    let people = relations::users_by_id(&mut conn, &ids)?;
    let mut tags = relations::tags_for_users(&mut conn, &ids)?;
    let today = Utc::now().date_naive();

    let items = rows
        .iter()
        .filter_map(|skip| {
            let user = people.get(&skip.skipped_id)?;
            Some(SkipEntry {
                id: skip.id,
                user: project_user(user, &tags.remove(&skip.skipped_id).unwrap_or_default(), today),
                created_at: skip.created_at,
            })
        })
        .collect();

    Ok(Json(ApiResponse::ok(Paginated::new(items, total, &page))))
}

// --- DELETE /skips/:user_id ---

pub async fn unskip_user(
    State(state): State<Arc<AppState>>,
    CurrentUser(me): CurrentUser,
    Path(skipped_user_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<MessageBody>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let deleted = diesel::delete(
        skips::table
            .filter(skips::skipper_id.eq(me.id))
            .filter(skips::skipped_id.eq(skipped_user_id)),
    )
    .execute(&mut conn)?;
    if deleted == 0 {
        return Err(AppError::new(ErrorCode::SkipNotFound, "skip not found"));
    }

    tracing::info!(user_id = %me.id, target_id = %skipped_user_id, "skip removed");

    Ok(Json(ApiResponse::message("Skip removed")))
}
