use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{NaiveDate, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use qupid_shared::errors::{AppError, AppResult, ErrorCode};
use qupid_shared::types::{ApiResponse, MessageBody};

use crate::extractors::CurrentUser;
use crate::models::{NewUserTag, Tag, UpdatePrivacy, UpdateProfile, User};
use crate::schema::{tags, user_tags, users};
use crate::services::relations;
use crate::services::views::{own_profile, project_user, OwnProfile, PrivacySettings, PublicUser, TagView};
use crate::AppState;

// --- Request DTOs ---

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 100, message = "display name must be 1-100 characters"))]
    pub display_name: Option<String>,
    #[validate(length(max = 1000, message = "bio must be at most 1000 characters"))]
    pub bio: Option<String>,
    #[validate(length(max = 100))]
    pub campus: Option<String>,
    #[validate(length(max = 100))]
    pub faculty: Option<String>,
    #[validate(length(max = 50))]
    pub grade: Option<String>,
    pub birthday: Option<NaiveDate>,
    #[validate(length(max = 50))]
    pub gender: Option<String>,
    #[validate(length(max = 50))]
    pub sexuality: Option<String>,
    #[validate(length(max = 50))]
    pub looking_for: Option<String>,
}

impl From<UpdateProfileRequest> for UpdateProfile {
    fn from(req: UpdateProfileRequest) -> Self {
        Self {
            display_name: req.display_name,
            bio: req.bio,
            campus: req.campus,
            faculty: req.faculty,
            grade: req.grade,
            birthday: req.birthday,
            gender: req.gender,
            sexuality: req.sexuality,
            looking_for: req.looking_for,
            profile_completed: None,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct InitialProfileRequest {
    #[validate(length(min = 1, max = 100, message = "display name must be 1-100 characters"))]
    pub display_name: String,
    #[validate(length(min = 1, max = 50))]
    pub gender: String,
    #[validate(length(min = 1, max = 50))]
    pub sexuality: String,
    #[validate(length(min = 1, max = 50))]
    pub looking_for: String,
}

#[derive(Debug, Deserialize)]
pub struct AddTagRequest {
    pub tag_id: Uuid,
}

fn reload_own_profile(conn: &mut PgConnection, user_id: Uuid) -> AppResult<OwnProfile> {
    let user = users::table.find(user_id).first::<User>(conn)?;
    let tags = relations::tags_for_user(conn, user_id)?;
    Ok(own_profile(&user, &tags, Utc::now().date_naive()))
}

// --- GET /users/me ---

pub async fn get_me(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<ApiResponse<OwnProfile>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    let tags = relations::tags_for_user(&mut conn, user.id)?;
    Ok(Json(ApiResponse::ok(own_profile(&user, &tags, Utc::now().date_naive()))))
}

// --- PUT /users/me ---

pub async fn update_me(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<UpdateProfileRequest>,
) -> AppResult<Json<ApiResponse<OwnProfile>>> {
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))?;
    if req.birthday.is_some_and(|b| b > Utc::now().date_naive()) {
        return Err(AppError::new(ErrorCode::ValidationError, "birthday cannot be in the future"));
    }

    let changes = UpdateProfile::from(req);
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    diesel::update(users::table.find(user.id))
        .set((&changes, users::updated_at.eq(Utc::now())))
        .execute(&mut conn)?;

    tracing::info!(user_id = %user.id, "profile updated");

    Ok(Json(ApiResponse::ok(reload_own_profile(&mut conn, user.id)?)))
}

// --- PUT /users/me/privacy ---

pub async fn update_privacy(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<UpdatePrivacy>,
) -> AppResult<Json<ApiResponse<PrivacySettings>>> {
    if req.is_empty() {
        return Ok(Json(ApiResponse::ok(PrivacySettings::from(&user))));
    }

    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    let updated: User = diesel::update(users::table.find(user.id))
        .set((&req, users::updated_at.eq(Utc::now())))
        .get_result(&mut conn)?;

    tracing::info!(user_id = %user.id, "privacy settings updated");

    Ok(Json(ApiResponse::ok(PrivacySettings::from(&updated))))
}

// --- POST /users/me/initial-profile ---

pub async fn initial_profile(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<InitialProfileRequest>,
) -> AppResult<Json<ApiResponse<OwnProfile>>> {
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))?;

    let changes = UpdateProfile {
        display_name: Some(req.display_name),
        gender: Some(req.gender),
        sexuality: Some(req.sexuality),
        looking_for: Some(req.looking_for),
        profile_completed: Some(true),
        ..Default::default()
    };

    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    diesel::update(users::table.find(user.id))
        .set((&changes, users::updated_at.eq(Utc::now())))
        .execute(&mut conn)?;

    tracing::info!(user_id = %user.id, "initial profile completed");

    Ok(Json(ApiResponse::ok(reload_own_profile(&mut conn, user.id)?)))
}

// --- GET /users/:id ---

/// Blocked users look exactly like missing ones.
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    CurrentUser(me): CurrentUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<PublicUser>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let user = relations::find_active_user(&mut conn, user_id)?;
    if user.id != me.id && relations::is_blocked_either_way(&mut conn, me.id, user.id)? {
        return Err(AppError::new(ErrorCode::UserNotFound, "user not found"));
    }

    let tags = relations::tags_for_user(&mut conn, user.id)?;
    Ok(Json(ApiResponse::ok(project_user(&user, &tags, Utc::now().date_naive()))))
}

// --- GET /users/me/tags ---

pub async fn my_tags(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<ApiResponse<Vec<TagView>>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    let tags = relations::tags_for_user(&mut conn, user.id)?;
    Ok(Json(ApiResponse::ok(tags.iter().map(TagView::from).collect())))
}

// --- POST /users/me/tags ---

pub async fn add_my_tag(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Json(req): Json<AddTagRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<TagView>>)> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let tag = tags::table
        .find(req.tag_id)
        .first::<Tag>(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::TagNotFound, "tag not found"))?;

    let inserted = diesel::insert_into(user_tags::table)
        .values(&NewUserTag { user_id: user.id, tag_id: tag.id })
        .on_conflict((user_tags::user_id, user_tags::tag_id))
        .do_nothing()
        .execute(&mut conn)?;
    if inserted == 0 {
        return Err(AppError::new(ErrorCode::TagAlreadyAdded, "tag already added to profile"));
    }

    tracing::info!(user_id = %user.id, tag_id = %tag.id, "tag added to profile");

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(TagView::from(&tag)))))
}

// --- DELETE /users/me/tags/:tag_id ---

pub async fn remove_my_tag(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(tag_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<MessageBody>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let deleted = diesel::delete(
        user_tags::table
            .filter(user_tags::user_id.eq(user.id))
            .filter(user_tags::tag_id.eq(tag_id)),
    )
    .execute(&mut conn)?;
    if deleted == 0 {
        return Err(AppError::new(ErrorCode::TagNotFound, "tag is not on your profile"));
    }

    tracing::info!(user_id = %user.id, tag_id = %tag_id, "tag removed from profile");

    Ok(Json(ApiResponse::message("Tag removed")))
}
