use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use qupid_shared::errors::{AppError, AppResult, ErrorCode};
use qupid_shared::types::{ApiResponse, MessageBody, Paginated, PaginationParams};

use crate::extractors::CurrentUser;
use crate::models::{Like, NewLike, User};
use crate::schema::likes;
use crate::services::matching::{self, MatchEdge};
use crate::services::relations::{self, LikeStatus};
use crate::services::views::{project_user, PublicUser};
use crate::AppState;

// --- Request DTOs ---

#[derive(Debug, Deserialize)]
pub struct SendLikeRequest {
    pub liked_user_id: Uuid,
}

// --- Response DTOs ---

#[derive(Debug, Serialize)]
pub struct SendLikeResponse {
    pub like: Like,
    pub is_match: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_user: Option<PublicUser>,
}

#[derive(Debug, Serialize)]
pub struct LikeEntry {
    pub id: Uuid,
    pub user: PublicUser,
    pub created_at: DateTime<Utc>,
    pub is_matched: bool,
}

#[derive(Debug, Serialize)]
pub struct MatchEntry {
    pub user: PublicUser,
    pub matched_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct MatchStatusResponse {
    pub is_matched: bool,
    #[serde(rename = "match", skip_serializing_if = "Option::is_none")]
    pub matched: Option<MatchEntry>,
    pub like_status: LikeStatus,
}

// --- POST /likes ---

pub async fn send_like(
    State(state): State<Arc<AppState>>,
    CurrentUser(me): CurrentUser,
    Json(req): Json<SendLikeRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<SendLikeResponse>>)> {
    if req.liked_user_id == me.id {
        return Err(AppError::new(ErrorCode::CannotLikeSelf, "cannot like yourself"));
    }

    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let target = relations::find_active_user(&mut conn, req.liked_user_id)?;
    relations::ensure_not_blocked(&mut conn, me.id, target.id)?;

    let (like, is_match) = conn.transaction::<_, AppError, _>(|conn| {
        let like = diesel::insert_into(likes::table)
            .values(&NewLike { liker_id: me.id, liked_id: target.id })
            .on_conflict((likes::liker_id, likes::liked_id))
            .do_nothing()
            .get_result::<Like>(conn)
            .optional()?
            .ok_or_else(|| AppError::new(ErrorCode::AlreadyLiked, "you have already liked this user"))?;

        let reciprocal = likes::table
            .filter(likes::liker_id.eq(target.id))
            .filter(likes::liked_id.eq(me.id))
            .count()
            .get_result::<i64>(conn)?
            > 0;

        Ok((like, reciprocal))
    })?;

    metrics::counter!("likes_sent_total").increment(1);

    let matched_user = if is_match {
        metrics::counter!("matches_total").increment(1);
        tracing::info!(user_id = %me.id, target_id = %target.id, "mutual like, match created");
        let tags = relations::tags_for_user(&mut conn, target.id)?;
        Some(project_user(&target, &tags, Utc::now().date_naive()))
    } else {
        tracing::info!(user_id = %me.id, target_id = %target.id, "like sent");
        None
    };

    let message = if is_match { "Like sent - it's a match!" } else { "Like sent" };
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok_with_message(
            SendLikeResponse { like, is_match, matched_user },
            message,
        )),
    ))
}

/// Sent (`outgoing`) or received likes, each annotated with the match flag.
/// Partners blocked in either direction are left out.
fn list_likes(
    state: &AppState,
    me: &User,
    page: &PaginationParams,
    outgoing: bool,
) -> AppResult<Paginated<LikeEntry>> {
    page.validate()?;
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let blocked = relations::block_partners(&mut conn, me.id)?;

    let (total, rows) = if outgoing {
        let total = likes::table
            .filter(likes::liker_id.eq(me.id))
            .filter(likes::liked_id.ne_all(blocked.clone()))
            .count()
            .get_result::<i64>(&mut conn)?;
        let rows = likes::table
            .filter(likes::liker_id.eq(me.id))
            .filter(likes::liked_id.ne_all(blocked))
            .order(likes::created_at.desc())
            .limit(page.limit)
            .offset(page.offset)
            .load::<Like>(&mut conn)?;
        (total, rows)
    } else {
        let total = likes::table
            .filter(likes::liked_id.eq(me.id))
            .filter(likes::liker_id.ne_all(blocked.clone()))
            .count()
            .get_result::<i64>(&mut conn)?;
        let rows = likes::table
            .filter(likes::liked_id.eq(me.id))
            .filter(likes::liker_id.ne_all(blocked))
            .order(likes::created_at.desc())
            .limit(page.limit)
            .offset(page.offset)
            .load::<Like>(&mut conn)?;
        (total, rows)
    };

    let counterpart = |like: &Like| if outgoing { like.liked_id } else { like.liker_id };
    let ids: Vec<Uuid> = rows.iter().map(counterpart).collect();

    let people = relations::users_by_id(&mut conn, &ids)?;
    let mut tags = relations::tags_for_users(&mut conn, &ids)?;
    let index = relations::like_index(&mut conn, me.id)?;
    let today = Utc::now().date_naive();

    let items = rows
        .iter()
        .filter_map(|like| {
            let other = counterpart(like);
            let user = people.get(&other)?;
            let user_tags = tags.remove(&other).unwrap_or_default();
            Some(LikeEntry {
                id: like.id,
                user: project_user(user, &user_tags, today),
                created_at: like.created_at,
                is_matched: index.status(other).is_matched,
            })
        })
        .collect();

    Ok(Paginated::new(items, total, page))
}

// --- GET /likes/sent ---

pub async fn sent_likes(
    State(state): State<Arc<AppState>>,
    CurrentUser(me): CurrentUser,
    Query(page): Query<PaginationParams>,
) -> AppResult<Json<ApiResponse<Paginated<LikeEntry>>>> {
    Ok(Json(ApiResponse::ok(list_likes(&state, &me, &page, true)?)))
}

// --- GET /likes/received ---

pub async fn received_likes(
    State(state): State<Arc<AppState>>,
    CurrentUser(me): CurrentUser,
    Query(page): Query<PaginationParams>,
) -> AppResult<Json<ApiResponse<Paginated<LikeEntry>>>> {
    Ok(Json(ApiResponse::ok(list_likes(&state, &me, &page, false)?)))
}

// --- DELETE /likes/:user_id ---

pub async fn remove_like(
    State(state): State<Arc<AppState>>,
    CurrentUser(me): CurrentUser,
    Path(liked_user_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<MessageBody>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let deleted = diesel::delete(
        likes::table
            .filter(likes::liker_id.eq(me.id))
            .filter(likes::liked_id.eq(liked_user_id)),
    )
    .execute(&mut conn)?;
    if deleted == 0 {
        return Err(AppError::new(ErrorCode::LikeNotFound, "like not found"));
    }

    tracing::info!(user_id = %me.id, target_id = %liked_user_id, "like removed");

    Ok(Json(ApiResponse::message("Like removed")))
}

/// Mutual likes of `me`, newest first, minus blocked or deactivated partners.
fn load_matches(conn: &mut PgConnection, me: Uuid) -> AppResult<Vec<(MatchEdge, User)>> {
    let sent = likes::table.filter(likes::liker_id.eq(me)).load::<Like>(conn)?;
    let received = likes::table.filter(likes::liked_id.eq(me)).load::<Like>(conn)?;
    let edges = matching::derive_matches(&sent, &received);

    let blocked: std::collections::HashSet<Uuid> = relations::block_partners(conn, me)?.into_iter().collect();
    let ids: Vec<Uuid> = edges.iter().map(|e| e.user_id).collect();
    let mut people = relations::users_by_id(conn, &ids)?;

    Ok(edges
        .into_iter()
        .filter(|e| !blocked.contains(&e.user_id))
        .filter_map(|e| {
            let user = people.remove(&e.user_id).filter(|u| u.is_active)?;
            Some((e, user))
        })
        .collect())
}

// --- GET /matches ---

pub async fn list_matches(
    State(state): State<Arc<AppState>>,
    CurrentUser(me): CurrentUser,
    Query(page): Query<PaginationParams>,
) -> AppResult<Json<ApiResponse<Paginated<MatchEntry>>>> {
    page.validate()?;
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let matches = load_matches(&mut conn, me.id)?;
    let total = matches.len() as i64;

    let window: Vec<(MatchEdge, User)> = matches
        .into_iter()
        .skip(page.offset as usize)
        .take(page.limit as usize)
        .collect();
    let ids: Vec<Uuid> = window.iter().map(|(e, _)| e.user_id).collect();
    let mut tags = relations::tags_for_users(&mut conn, &ids)?;
    let today = Utc::now().date_naive();

    let items = window
        .into_iter()
        .map(|(edge, user)| MatchEntry {
            user: project_user(&user, &tags.remove(&user.id).unwrap_or_default(), today),
            matched_at: edge.matched_at,
        })
        .collect();

    Ok(Json(ApiResponse::ok(Paginated::new(items, total, &page))))
}

// --- GET /matches/:user_id ---

pub async fn match_status(
    State(state): State<Arc<AppState>>,
    CurrentUser(me): CurrentUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<MatchStatusResponse>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let other = relations::find_active_user(&mut conn, user_id)?;
    if relations::is_blocked_either_way(&mut conn, me.id, other.id)? {
        return Err(AppError::new(ErrorCode::UserNotFound, "user not found"));
    }

    let like_status = relations::like_status(&mut conn, me.id, other.id)?;

    let matched = if like_status.is_matched {
        let pair: Vec<Like> = likes::table
            .filter(
                likes::liker_id.eq(me.id).and(likes::liked_id.eq(other.id))
                    .or(likes::liker_id.eq(other.id).and(likes::liked_id.eq(me.id))),
            )
            .load(&mut conn)?;
        let matched_at = pair.iter().map(|l| l.created_at).max().unwrap_or_else(Utc::now);
        let tags = relations::tags_for_user(&mut conn, other.id)?;
        Some(MatchEntry {
            user: project_user(&other, &tags, Utc::now().date_naive()),
            matched_at,
        })
    } else {
        None
    };

    Ok(Json(ApiResponse::ok(MatchStatusResponse {
        is_matched: like_status.is_matched,
        matched,
        like_status,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_status_renames_match_field() {
        let body = MatchStatusResponse {
            is_matched: false,
            matched: None,
            like_status: LikeStatus::new(true, false),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["is_matched"], false);
        assert!(json.get("match").is_none());
        assert_eq!(json["like_status"]["i_liked"], true);
        assert_eq!(json["like_status"]["they_liked"], false);
    }

    #[test]
    fn like_request_requires_uuid() {
        assert!(serde_json::from_str::<SendLikeRequest>(r#"{"liked_user_id":5}"#).is_err());
        let id = Uuid::new_v4();
        let req: SendLikeRequest = serde_json::from_str(&format!(r#"{{"liked_user_id":"{id}"}}"#)).unwrap();
        assert_eq!(req.liked_user_id, id);
    }
}
