//! Discovery candidate queries. Exclusions, privacy-gated filters and free
//! text run in Postgres; callers add ordering and paging.

use chrono::NaiveDate;
use diesel::pg::{Pg, PgConnection};
use diesel::prelude::*;
use diesel::sql_types::Text;
use uuid::Uuid;

use qupid_shared::errors::AppResult;

use crate::models::User;
use crate::schema::{tags, user_tags, users};
use crate::services::matching::{birthday_bounds, CandidateProfile, ExclusionSet, ProfileFilters};
use crate::services::relations;

diesel::define_sql_function!(fn lower(x: Text) -> Text);

/// Tag-sharing users scanned before suggestion ranking, newest first.
pub const SUGGESTION_WINDOW: i64 = 500;

pub fn escape_like(raw: &str) -> String {
    raw.trim().replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

pub fn search_pattern(raw: &str) -> String {
    format!("%{}%", escape_like(raw))
}

/// `flag = true AND lower(column) IN values`, skipped when `values` is empty.
macro_rules! shown_one_of {
    ($query:ident, $values:expr, $flag:expr, $column:expr) => {
        if !$values.is_empty() {
            $query = $query.filter(
                $flag
                    .eq(true)
                    .and(lower($column.assume_not_null()).eq_any($values.clone())),
            );
        }
    };
}

/// Active users outside `excluded` that pass `filters` and, when given, the
/// free text. Display name always matches; bio only when shown.
pub fn filtered(
    excluded: &ExclusionSet,
    filters: &ProfileFilters,
    text: Option<&str>,
    today: NaiveDate,
) -> users::BoxedQuery<'static, Pg> {
    let mut query = users::table
        .filter(users::is_active.eq(true))
        .filter(users::id.ne_all(excluded.to_vec()))
        .into_boxed();

    shown_one_of!(query, filters.campus, users::show_campus, users::campus);
    shown_one_of!(query, filters.faculty, users::show_faculty, users::faculty);
    shown_one_of!(query, filters.grade, users::show_grade, users::grade);
    shown_one_of!(query, filters.gender, users::show_gender, users::gender);
    shown_one_of!(query, filters.sexuality, users::show_sexuality, users::sexuality);
    shown_one_of!(query, filters.looking_for, users::show_looking_for, users::looking_for);

    if !filters.tags.is_empty() {
        let named = tags::table
            .filter(lower(tags::name).eq_any(filters.tags.clone()))
            .select(tags::id);
        let tagged = user_tags::table
            .filter(user_tags::tag_id.eq_any(named))
            .select(user_tags::user_id);
        query = query.filter(users::show_tags.eq(true).and(users::id.eq_any(tagged)));
    }

    if filters.min_age.is_some() || filters.max_age.is_some() {
        query = query
            .filter(users::show_age.eq(true))
            .filter(users::birthday.is_not_null());
        let (born_by, born_after) = birthday_bounds(filters.min_age, filters.max_age, today);
        if let Some(date) = born_by {
            query = query.filter(users::birthday.le(date));
        }
        if let Some(date) = born_after {
            query = query.filter(users::birthday.gt(date));
        }
    }

    if let Some(text) = text.map(str::trim).filter(|t| !t.is_empty()) {
        let pattern = search_pattern(text);
        query = query.filter(
            users::display_name.ilike(pattern.clone()).or(users::show_bio
                .eq(true)
                .and(users::bio.assume_not_null().ilike(pattern))),
        );
    }

    query
}

pub fn newest_first(query: users::BoxedQuery<'static, Pg>) -> users::BoxedQuery<'static, Pg> {
    query.order((users::created_at.desc(), users::id.asc()))
}

/// Case-insensitive display name order, id as the tie breaker.
pub fn by_name(query: users::BoxedQuery<'static, Pg>) -> users::BoxedQuery<'static, Pg> {
    query.order((lower(users::display_name).asc(), users::id.asc()))
}

/// Attaches each user's tags in one query.
pub fn with_tags(conn: &mut PgConnection, rows: Vec<User>) -> AppResult<Vec<CandidateProfile>> {
    let ids: Vec<_> = rows.iter().map(|u| u.id).collect();
    let mut tags = relations::tags_for_users(conn, &ids)?;

    Ok(rows
        .into_iter()
        .map(|user| CandidateProfile {
            tags: tags.remove(&user.id).unwrap_or_default(),
            user,
        })
        .collect())
}

/// Filtered users who show at least one of `my_tag_ids`, capped at
/// [`SUGGESTION_WINDOW`].
pub fn tag_overlap_window(
    conn: &mut PgConnection,
    excluded: &ExclusionSet,
    filters: &ProfileFilters,
    my_tag_ids: Vec<Uuid>,
    today: NaiveDate,
) -> AppResult<Vec<CandidateProfile>> {
    if my_tag_ids.is_empty() {
        return Ok(Vec::new());
    }

    let sharing = user_tags::table
        .filter(user_tags::tag_id.eq_any(my_tag_ids))
        .select(user_tags::user_id);

    let query = filtered(excluded, filters, None, today)
        .filter(users::show_tags.eq(true))
        .filter(users::id.eq_any(sharing));
    let rows = newest_first(query)
        .limit(SUGGESTION_WINDOW)
        .load::<User>(conn)?;

    with_tags(conn, rows)
}

/// Newest completed profiles passing `filters`.
pub fn recently_joined(
    conn: &mut PgConnection,
    excluded: &ExclusionSet,
    filters: &ProfileFilters,
    limit: i64,
    today: NaiveDate,
) -> AppResult<Vec<CandidateProfile>> {
    let query = filtered(excluded, filters, None, today).filter(users::profile_completed.eq(true));
    let rows = newest_first(query)
        .limit(limit)
        .load::<User>(conn)?;

    with_tags(conn, rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::matching::FilterQuery;
    use diesel::debug_query;

    /// The WHERE clause and binds of the rendered query.
    fn sql(filters: &ProfileFilters, text: Option<&str>) -> String {
        let excluded = ExclusionSet::for_user(Uuid::new_v4());
        let today = NaiveDate::from_ymd_opt(2024, 6, 14).unwrap();
        let query = filtered(&excluded, filters, text, today);
        let rendered = debug_query::<Pg, _>(&query).to_string();
        let (_, clause) = rendered.split_once(" WHERE ").unwrap();
        clause.to_string()
    }

    #[test]
    fn search_pattern_escapes_wildcards() {
        assert_eq!(search_pattern(" hik "), "%hik%");
        assert_eq!(search_pattern("100%"), "%100\\%%");
        assert_eq!(search_pattern("a_b"), "%a\\_b%");
    }

    #[test]
    fn base_query_only_excludes() {
        let sql = sql(&ProfileFilters::default(), None);
        assert!(sql.contains("\"users\".\"is_active\" = $1"));
        assert!(sql.contains("!= ALL("));
        assert!(!sql.contains("ILIKE"));
        assert!(!sql.contains("show_campus"));
    }

    #[test]
    fn list_filters_are_gated_by_visibility() {
        let filters = ProfileFilters::from(&FilterQuery {
            campus: Some("Ito".into()),
            gender: Some("woman,man".into()),
            faculty: Some("all".into()),
            ..Default::default()
        });
        let sql = sql(&filters, None);
        assert!(sql.contains("\"users\".\"show_campus\" = $"));
        assert!(sql.contains("lower(\"users\".\"campus\")"));
        assert!(sql.contains("\"users\".\"show_gender\" = $"));
        assert!(!sql.contains("show_faculty"));
        assert!(sql.contains("\"ito\""));
    }

    #[test]
    fn tag_filter_uses_subselect() {
        let filters = ProfileFilters { tags: vec!["music".into()], ..Default::default() };
        let sql = sql(&filters, None);
        assert!(sql.contains("\"users\".\"show_tags\" = $"));
        assert!(sql.contains("IN (SELECT \"user_tags\".\"user_id\""));
        assert!(sql.contains("lower(\"tags\".\"name\")"));
    }

    #[test]
    fn age_filter_needs_shown_birthday() {
        let filters = ProfileFilters { min_age: Some(18), max_age: Some(25), ..Default::default() };
        let sql = sql(&filters, None);
        assert!(sql.contains("\"users\".\"show_age\" = $"));
        assert!(sql.contains("\"users\".\"birthday\" IS NOT NULL"));
        assert!(sql.contains("\"users\".\"birthday\" <= $"));
        assert!(sql.contains("\"users\".\"birthday\" > $"));
    }

    #[test]
    fn text_matches_name_or_shown_bio() {
        let sql = sql(&ProfileFilters::default(), Some("  aki "));
        assert!(sql.contains("\"users\".\"display_name\" ILIKE $"));
        assert!(sql.contains("\"users\".\"show_bio\" = $"));
        assert!(sql.contains("\"users\".\"bio\" ILIKE $"));
        assert!(sql.contains("\"%aki%\""));

        let blank = self::sql(&ProfileFilters::default(), Some("   "));
        assert!(!blank.contains("ILIKE"));
    }

    #[test]
    fn name_order_ignores_case() {
        let excluded = ExclusionSet::for_user(Uuid::new_v4());
        let today = NaiveDate::from_ymd_opt(2024, 6, 14).unwrap();
        let query = by_name(filtered(&excluded, &ProfileFilters::default(), None, today));
        let sql = debug_query::<Pg, _>(&query).to_string();
        assert!(sql.contains("ORDER BY lower(\"users\".\"display_name\") ASC, \"users\".\"id\" ASC"));

        let query = newest_first(filtered(&excluded, &ProfileFilters::default(), None, today));
        let sql = debug_query::<Pg, _>(&query).to_string();
        assert!(sql.contains("ORDER BY \"users\".\"created_at\" DESC, \"users\".\"id\" ASC"));
    }
}
