use axum::extract::{Query, State};
use axum::Json;
use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use qupid_shared::errors::{AppError, AppResult, ErrorCode};
use qupid_shared::types::{ApiResponse, PaginationParams};

use crate::extractors::CurrentUser;
use crate::models::User;
use crate::services::candidates;
use crate::services::matching::{self, FilterQuery, ProfileFilters};
use crate::services::relations::{self, LikeStatus};
use crate::services::views::{project_user, PublicUser};
use crate::AppState;

const DEFAULT_SUGGESTIONS: usize = 10;
const MAX_SUGGESTIONS: usize = 50;

// --- Query params ---

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchSort {
    #[default]
    Recent,
    Alphabetical,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    #[serde(default)]
    pub sort: SearchSort,
}

#[derive(Debug, Deserialize)]
pub struct SuggestionParams {
    pub limit: Option<usize>,
}

// --- Response DTOs ---

#[derive(Debug, Serialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub profile: PublicUser,
    pub like_status: LikeStatus,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub items: Vec<SearchHit>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
    pub sort: SearchSort,
    pub filters_applied: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct Suggestion {
    #[serde(flatten)]
    pub profile: PublicUser,
    pub match_score: f64,
    pub common_tags: usize,
    pub reason: String,
    pub has_received_like: bool,
}

// --- GET /users/search ---

pub async fn search(
    State(state): State<Arc<AppState>>,
    CurrentUser(me): CurrentUser,
    Query(filters): Query<FilterQuery>,
    Query(params): Query<SearchParams>,
    Query(page): Query<PaginationParams>,
) -> AppResult<Json<ApiResponse<SearchResponse>>> {
    page.validate()?;
    let filters = ProfileFilters::from(&filters);
    let today = Utc::now().date_naive();
    let text = params.q.as_deref();

    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    let excluded = relations::discovery_exclusions(&mut conn, me.id)?;

    let total = candidates::filtered(&excluded, &filters, text, today)
        .count()
        .get_result::<i64>(&mut conn)?;

    let query = candidates::filtered(&excluded, &filters, text, today);
    let query = match params.sort {
        SearchSort::Recent => candidates::newest_first(query),
        SearchSort::Alphabetical => candidates::by_name(query),
    };
    let rows = query
        .limit(page.limit)
        .offset(page.offset)
        .load::<User>(&mut conn)?;

    let hits = candidates::with_tags(&mut conn, rows)?;
    let likes = relations::like_index(&mut conn, me.id)?;

    let items = hits
        .iter()
        .map(|c| SearchHit {
            profile: project_user(&c.user, &c.tags, today),
            like_status: likes.status(c.user.id),
        })
        .collect();

    tracing::debug!(user_id = %me.id, total, "user search");

    Ok(Json(ApiResponse::ok(SearchResponse {
        items,
        total,
        limit: page.limit,
        offset: page.offset,
        sort: params.sort,
        filters_applied: filters.applied(),
    })))
}

// --- GET /users/suggestions ---

pub async fn suggestions(
    State(state): State<Arc<AppState>>,
    CurrentUser(me): CurrentUser,
    Query(filters): Query<FilterQuery>,
    Query(params): Query<SuggestionParams>,
) -> AppResult<Json<ApiResponse<Vec<Suggestion>>>> {
    let limit = params.limit.unwrap_or(DEFAULT_SUGGESTIONS);
    if !(1..=MAX_SUGGESTIONS).contains(&limit) {
        return Err(AppError::new(
            ErrorCode::ValidationError,
            format!("limit must be between 1 and {MAX_SUGGESTIONS}"),
        ));
    }
    let filters = ProfileFilters::from(&filters);
    let today = Utc::now().date_naive();

    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;
    let excluded = relations::discovery_exclusions(&mut conn, me.id)?;
    let my_tags = relations::tags_for_user(&mut conn, me.id)?;

    let my_tag_ids = my_tags.iter().map(|t| t.id).collect();
    let window = candidates::tag_overlap_window(&mut conn, &excluded, &filters, my_tag_ids, today)?;
    let mut ranked = matching::rank_suggestions(&my_tags, window, limit);

    // Remaining slots go to recently joined profiles.
    if ranked.len() < limit {
        let remaining = limit - ranked.len();
        let mut seen = excluded.clone();
        seen.extend(ranked.iter().map(|r| r.candidate.user.id));
        let recent = candidates::recently_joined(&mut conn, &seen, &filters, remaining as i64, today)?;
        ranked.extend(matching::rank_suggestions(&[], recent, remaining));
    }

    let likes = relations::like_index(&mut conn, me.id)?;

    let items = ranked
        .into_iter()
        .map(|r| Suggestion {
            has_received_like: likes.liked_me.contains(&r.candidate.user.id),
            profile: project_user(&r.candidate.user, &r.candidate.tags, today),
            match_score: r.match_score,
            common_tags: r.score,
            reason: r.reason,
        })
        .collect::<Vec<_>>();

    tracing::debug!(user_id = %me.id, count = items.len(), "suggestions computed");

    Ok(Json(ApiResponse::ok(items)))
}
