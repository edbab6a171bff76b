use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use qupid_shared::errors::{AppError, AppResult, ErrorCode};
use qupid_shared::types::{ApiResponse, MessageBody, Paginated, PaginationParams};

use crate::extractors::CurrentUser;
use crate::models::{Block, NewBlock, NewReport, Report, User};
use crate::schema::{blocks, reports, users};
use crate::services::moderation::ReportStatus;
use crate::services::relations;
use crate::services::views::{project_summary, UserSummary};
use crate::AppState;

// --- Request DTOs ---

#[derive(Debug, Deserialize)]
pub struct BlockRequest {
    pub blocked_user_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReportRequest {
    pub target_user_id: Uuid,
    #[validate(length(min = 1, max = 1000, message = "reason must be 1-1000 characters"))]
    pub reason: String,
}

// --- Response DTOs ---

#[derive(Debug, Serialize)]
pub struct BlockEntry {
    pub id: Uuid,
    pub user: UserSummary,
    pub created_at: DateTime<Utc>,
}

// --- POST /blocks ---

pub async fn block_user(
    State(state): State<Arc<AppState>>,
    CurrentUser(me): CurrentUser,
    Json(req): Json<BlockRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Block>>)> {
    if req.blocked_user_id == me.id {
        return Err(AppError::new(ErrorCode::CannotBlockSelf, "cannot block yourself"));
    }

    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let exists = users::table
        .find(req.blocked_user_id)
        .count()
        .get_result::<i64>(&mut conn)?
        > 0;
    if !exists {
        return Err(AppError::new(ErrorCode::UserNotFound, "user not found"));
    }

    let block = diesel::insert_into(blocks::table)
        .values(&NewBlock { blocker_id: me.id, blocked_id: req.blocked_user_id })
        .on_conflict((blocks::blocker_id, blocks::blocked_id))
        .do_nothing()
        .get_result::<Block>(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::AlreadyBlocked, "user already blocked"))?;

    tracing::info!(user_id = %me.id, target_id = %req.blocked_user_id, "user blocked");

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(block))))
}

// --- GET /blocks/my ---

pub async fn my_blocks(
    State(state): State<Arc<AppState>>,
    CurrentUser(me): CurrentUser,
    Query(page): Query<PaginationParams>,
) -> AppResult<Json<ApiResponse<Paginated<BlockEntry>>>> {
    page.validate()?;
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let total = blocks::table
        .filter(blocks::blocker_id.eq(me.id))
        .count()
        .get_result::<i64>(&mut conn)?;
    let rows = blocks::table
        .filter(blocks::blocker_id.eq(me.id))
        .order(blocks::created_at.desc())
        .limit(page.limit)
        .offset(page.offset)
        .load::<Block>(&mut conn)?;

    let ids: Vec<Uuid> = rows.iter().map(|b| b.blocked_id).collect();
    let people = relations::users_by_id(&mut conn, &ids)?;

    let items = rows
        .iter()
        .filter_map(|block| {
            people.get(&block.blocked_id).map(|user| BlockEntry {
                id: block.id,
                user: project_summary(user),
                created_at: block.created_at,
            })
        })
        .collect();

    Ok(Json(ApiResponse::ok(Paginated::new(items, total, &page))))
}

// --- DELETE /blocks/:user_id ---

pub async fn unblock_user(
    State(state): State<Arc<AppState>>,
    CurrentUser(me): CurrentUser,
    Path(blocked_user_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<MessageBody>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let deleted = diesel::delete(
        blocks::table
            .filter(blocks::blocker_id.eq(me.id))
            .filter(blocks::blocked_id.eq(blocked_user_id)),
    )
    .execute(&mut conn)?;
    if deleted == 0 {
        return Err(AppError::new(ErrorCode::BlockNotFound, "block not found"));
    }

    tracing::info!(user_id = %me.id, target_id = %blocked_user_id, "user unblocked");

    Ok(Json(ApiResponse::message("User unblocked")))
}

// --- POST /reports ---

pub async fn create_report(
    State(state): State<Arc<AppState>>,
    CurrentUser(me): CurrentUser,
    Json(req): Json<ReportRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Report>>)> {
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))?;
    let reason = req.reason.trim().to_string();
    if reason.is_empty() {
        return Err(AppError::new(ErrorCode::ValidationError, "reason cannot be blank"));
    }
    if req.target_user_id == me.id {
        return Err(AppError::new(ErrorCode::CannotReportSelf, "cannot report yourself"));
    }

    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let target = users::table
        .find(req.target_user_id)
        .first::<User>(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::UserNotFound, "target user not found"))?;

    let report = conn.transaction::<_, AppError, _>(|conn| {
        let pending = reports::table
            .filter(reports::reporter_id.eq(me.id))
            .filter(reports::target_user_id.eq(target.id))
            .filter(reports::status.eq_any([ReportStatus::Open.as_str(), ReportStatus::Reviewing.as_str()]))
            .count()
            .get_result::<i64>(conn)?;
        if pending > 0 {
            return Err(AppError::new(
                ErrorCode::DuplicateReport,
                "you already have an open report against this user",
            ));
        }

        let report = diesel::insert_into(reports::table)
            .values(&NewReport {
                reporter_id: Some(me.id),
                target_user_id: Some(target.id),
                reason,
                status: ReportStatus::Open.as_str().to_string(),
            })
            .get_result::<Report>(conn)?;
        Ok(report)
    })?;

    tracing::info!(report_id = %report.id, user_id = %me.id, target_id = %target.id, "report filed");

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(report))))
}

// --- GET /reports/my ---

pub async fn my_reports(
    State(state): State<Arc<AppState>>,
    CurrentUser(me): CurrentUser,
    Query(page): Query<PaginationParams>,
) -> AppResult<Json<ApiResponse<Paginated<Report>>>> {
    page.validate()?;
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let total = reports::table
        .filter(reports::reporter_id.eq(me.id))
        .count()
        .get_result::<i64>(&mut conn)?;
    let items = reports::table
        .filter(reports::reporter_id.eq(me.id))
        .order(reports::created_at.desc())
        .limit(page.limit)
        .offset(page.offset)
        .load::<Report>(&mut conn)?;

    Ok(Json(ApiResponse::ok(Paginated::new(items, total, &page))))
}

// --- GET /reports/:id ---

pub async fn get_my_report(
    State(state): State<Arc<AppState>>,
    CurrentUser(me): CurrentUser,
    Path(report_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Report>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let report = reports::table
        .find(report_id)
        .first::<Report>(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::ReportNotFound, "report not found"))?;

    if report.reporter_id != Some(me.id) {
        return Err(AppError::forbidden("you can only view your own reports"));
    }

    Ok(Json(ApiResponse::ok(report)))
}
