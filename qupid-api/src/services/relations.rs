//! Queries over the like/skip/block graph shared by several route modules.

use std::collections::{HashMap, HashSet};

use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use qupid_shared::errors::{AppError, AppResult, ErrorCode};

use crate::models::{Tag, User};
use crate::schema::{blocks, likes, skips, tags, user_tags, users};
use crate::services::matching::ExclusionSet;

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct LikeStatus {
    pub i_liked: bool,
    pub they_liked: bool,
    pub is_matched: bool,
}

impl LikeStatus {
    pub fn new(i_liked: bool, they_liked: bool) -> Self {
        Self { i_liked, they_liked, is_matched: i_liked && they_liked }
    }
}

/// Like edges touching the caller, for annotating result lists.
#[derive(Debug, Default)]
pub struct LikeIndex {
    pub liked_by_me: HashSet<Uuid>,
    pub liked_me: HashSet<Uuid>,
}

impl LikeIndex {
    pub fn status(&self, other: Uuid) -> LikeStatus {
        LikeStatus::new(self.liked_by_me.contains(&other), self.liked_me.contains(&other))
    }
}

pub fn find_active_user(conn: &mut PgConnection, user_id: Uuid) -> AppResult<User> {
    users::table
        .find(user_id)
        .filter(users::is_active.eq(true))
        .first::<User>(conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::UserNotFound, "user not found"))
}

pub fn is_blocked_either_way(conn: &mut PgConnection, a: Uuid, b: Uuid) -> AppResult<bool> {
    let count = blocks::table
        .filter(
            blocks::blocker_id.eq(a).and(blocks::blocked_id.eq(b))
                .or(blocks::blocker_id.eq(b).and(blocks::blocked_id.eq(a))),
        )
        .count()
        .get_result::<i64>(conn)?;
    Ok(count > 0)
}

pub fn ensure_not_blocked(conn: &mut PgConnection, a: Uuid, b: Uuid) -> AppResult<()> {
    if is_blocked_either_way(conn, a, b)? {
        return Err(AppError::new(ErrorCode::UserBlocked, "interaction with this user is blocked"));
    }
    Ok(())
}

/// Users blocked by `me` plus users who blocked `me`.
pub fn block_partners(conn: &mut PgConnection, me: Uuid) -> AppResult<Vec<Uuid>> {
    let mut ids: Vec<Uuid> = blocks::table
        .filter(blocks::blocker_id.eq(me))
        .select(blocks::blocked_id)
        .load(conn)?;
    let blocking_me: Vec<Uuid> = blocks::table
        .filter(blocks::blocked_id.eq(me))
        .select(blocks::blocker_id)
        .load(conn)?;
    ids.extend(blocking_me);
    Ok(ids)
}

/// Self, blocks in both directions, users already liked and users skipped.
pub fn discovery_exclusions(conn: &mut PgConnection, me: Uuid) -> AppResult<ExclusionSet> {
    let mut set = ExclusionSet::for_user(me);
    set.extend(block_partners(conn, me)?);

    let liked: Vec<Uuid> = likes::table
        .filter(likes::liker_id.eq(me))
        .select(likes::liked_id)
        .load(conn)?;
    set.extend(liked);

    let skipped: Vec<Uuid> = skips::table
        .filter(skips::skipper_id.eq(me))
        .select(skips::skipped_id)
        .load(conn)?;
    set.extend(skipped);

    Ok(set)
}

pub fn like_index(conn: &mut PgConnection, me: Uuid) -> AppResult<LikeIndex> {
    let liked_by_me: Vec<Uuid> = likes::table
        .filter(likes::liker_id.eq(me))
        .select(likes::liked_id)
        .load(conn)?;
    let liked_me: Vec<Uuid> = likes::table
        .filter(likes::liked_id.eq(me))
        .select(likes::liker_id)
        .load(conn)?;
    Ok(LikeIndex {
        liked_by_me: liked_by_me.into_iter().collect(),
        liked_me: liked_me.into_iter().collect(),
    })
}

pub fn like_status(conn: &mut PgConnection, me: Uuid, other: Uuid) -> AppResult<LikeStatus> {
    let i_liked = likes::table
        .filter(likes::liker_id.eq(me).and(likes::liked_id.eq(other)))
        .count()
        .get_result::<i64>(conn)?
        > 0;
    let they_liked = likes::table
        .filter(likes::liker_id.eq(other).and(likes::liked_id.eq(me)))
        .count()
        .get_result::<i64>(conn)?
        > 0;
    Ok(LikeStatus::new(i_liked, they_liked))
}

pub fn tags_for_user(conn: &mut PgConnection, user_id: Uuid) -> AppResult<Vec<Tag>> {
    let rows = user_tags::table
        .inner_join(tags::table)
        .filter(user_tags::user_id.eq(user_id))
        .order(tags::name.asc())
        .select(tags::all_columns)
        .load::<Tag>(conn)?;
    Ok(rows)
}

pub fn tags_for_users(conn: &mut PgConnection, user_ids: &[Uuid]) -> AppResult<HashMap<Uuid, Vec<Tag>>> {
    if user_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows: Vec<(Uuid, Tag)> = user_tags::table
        .inner_join(tags::table)
        .filter(user_tags::user_id.eq_any(user_ids))
        .order(tags::name.asc())
        .select((user_tags::user_id, tags::all_columns))
        .load(conn)?;

    let mut by_user: HashMap<Uuid, Vec<Tag>> = HashMap::new();
    for (user_id, tag) in rows {
        by_user.entry(user_id).or_default().push(tag);
    }
    Ok(by_user)
}

pub fn users_by_id(conn: &mut PgConnection, ids: &[Uuid]) -> AppResult<HashMap<Uuid, User>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows = users::table
        .filter(users::id.eq_any(ids))
        .load::<User>(conn)?;
    Ok(rows.into_iter().map(|u| (u.id, u)).collect())
}
