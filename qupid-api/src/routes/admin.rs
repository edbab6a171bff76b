use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use qupid_shared::errors::{AppError, AppResult, ErrorCode};
use qupid_shared::types::{ApiResponse, Paginated, PaginationParams};

use crate::extractors::AdminUser;
use crate::models::{Report, User};
use crate::schema::reports;
use crate::services::moderation::{self, ReportStatus};
use crate::services::relations;
use crate::services::views::{project_summary, UserSummary};
use crate::AppState;

// --- Request / Response types ---

#[derive(Debug, Deserialize)]
pub struct ReportFilter {
    pub status: Option<ReportStatus>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateReportRequest {
    pub status: ReportStatus,
    #[validate(length(max = 2000, message = "admin note must be at most 2000 characters"))]
    pub admin_note: Option<String>,
}

/// A report with both parties resolved for the moderation console.
#[derive(Debug, Serialize)]
pub struct AdminReportView {
    pub id: Uuid,
    pub reason: String,
    pub status: String,
    pub admin_note: Option<String>,
    pub reporter: Option<UserSummary>,
    pub target_user: Option<UserSummary>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AdminReportView {
    fn new(report: Report, people: &HashMap<Uuid, User>) -> Self {
        let summary = |id: Option<Uuid>| id.and_then(|id| people.get(&id)).map(project_summary);
        Self {
            reporter: summary(report.reporter_id),
            target_user: summary(report.target_user_id),
            id: report.id,
            reason: report.reason,
            status: report.status,
            admin_note: report.admin_note,
            created_at: report.created_at,
            updated_at: report.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReportStats {
    pub total: i64,
    pub by_status: BTreeMap<&'static str, i64>,
}

fn parties(reports: &[Report]) -> Vec<Uuid> {
    reports
        .iter()
        .flat_map(|r| [r.reporter_id, r.target_user_id])
        .flatten()
        .collect()
}

fn find_report(conn: &mut PgConnection, report_id: Uuid) -> AppResult<Report> {
    reports::table
        .find(report_id)
        .first::<Report>(conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::ReportNotFound, "report not found"))
}

// --- GET /admin/reports ---

pub async fn list_reports(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Query(filter): Query<ReportFilter>,
    Query(page): Query<PaginationParams>,
) -> AppResult<Json<ApiResponse<Paginated<AdminReportView>>>> {
    page.validate()?;
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let mut query = reports::table.into_boxed();
    let mut count_query = reports::table.into_boxed();
    if let Some(status) = filter.status {
        query = query.filter(reports::status.eq(status.as_str()));
        count_query = count_query.filter(reports::status.eq(status.as_str()));
    }

    let total = count_query.count().get_result::<i64>(&mut conn)?;
    let rows = query
        .order(reports::created_at.desc())
        .limit(page.limit)
        .offset(page.offset)
        .load::<Report>(&mut conn)?;

    let people = relations::users_by_id(&mut conn, &parties(&rows))?;
    let items = rows.into_iter().map(|r| AdminReportView::new(r, &people)).collect();

    Ok(Json(ApiResponse::ok(Paginated::new(items, total, &page))))
}

// --- GET /admin/reports/stats ---

pub async fn report_stats(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
) -> AppResult<Json<ApiResponse<ReportStats>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let rows: Vec<(String, i64)> = reports::table
        .group_by(reports::status)
        .select((reports::status, diesel::dsl::count(reports::id)))
        .load(&mut conn)?;

    let mut by_status: BTreeMap<&'static str, i64> =
        ReportStatus::ALL.iter().map(|s| (s.as_str(), 0)).collect();
    for (status, count) in rows {
        if let Ok(status) = status.parse::<ReportStatus>() {
            by_status.insert(status.as_str(), count);
        }
    }

    Ok(Json(ApiResponse::ok(ReportStats {
        total: by_status.values().sum(),
        by_status,
    })))
}

// --- GET /admin/reports/:id ---

pub async fn get_report(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(report_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<AdminReportView>>> {
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let report = find_report(&mut conn, report_id)?;
    let people = relations::users_by_id(&mut conn, &parties(std::slice::from_ref(&report)))?;

    Ok(Json(ApiResponse::ok(AdminReportView::new(report, &people))))
}

// --- PUT /admin/reports/:id ---

pub async fn update_report(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(report_id): Path<Uuid>,
    Json(req): Json<UpdateReportRequest>,
) -> AppResult<Json<ApiResponse<AdminReportView>>> {
    req.validate()
        .map_err(|e| AppError::new(ErrorCode::ValidationError, e.to_string()))?;
    let mut conn = state.db.get().map_err(|e| AppError::internal(e.to_string()))?;

    let updated = conn.transaction::<_, AppError, _>(|conn| {
        let report = find_report(conn, report_id)?;
        let current: ReportStatus = report.status.parse()?;
        moderation::ensure_transition(current, req.status)?;

        // A missing note leaves the existing one untouched.
        let note = req.admin_note.clone().or(report.admin_note);
        let updated = diesel::update(reports::table.find(report.id))
            .set((
                reports::status.eq(req.status.as_str()),
                reports::admin_note.eq(note),
                reports::updated_at.eq(Utc::now()),
            ))
            .get_result::<Report>(conn)?;
        Ok(updated)
    })?;

    tracing::info!(admin_id = %admin.id, report_id = %updated.id, status = %updated.status, "report updated");

    let people = relations::users_by_id(&mut conn, &parties(std::slice::from_ref(&updated)))?;
    Ok(Json(ApiResponse::ok(AdminReportView::new(updated, &people))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::views::fixtures;

    fn report(reporter: Option<Uuid>, target: Option<Uuid>) -> Report {
        Report {
            id: Uuid::new_v4(),
            reporter_id: reporter,
            target_user_id: target,
            reason: "spam".into(),
            status: "open".into(),
            admin_note: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn parties_skip_deleted_users() {
        let a = Uuid::new_v4();
        let rows = vec![report(Some(a), None), report(None, None)];
        assert_eq!(parties(&rows), vec![a]);
    }

    #[test]
    fn view_resolves_known_parties() {
        let reporter = fixtures::user("Aki");
        let mut people = HashMap::new();
        people.insert(reporter.id, reporter.clone());

        let view = AdminReportView::new(report(Some(reporter.id), Some(Uuid::new_v4())), &people);
        assert_eq!(view.reporter.map(|r| r.display_name), Some("Aki".to_string()));
        assert!(view.target_user.is_none());
    }

    #[test]
    fn status_filter_parses_lowercase() {
        let filter: ReportFilter = serde_json::from_str(r#"{"status":"reviewing"}"#).unwrap();
        assert_eq!(filter.status, Some(ReportStatus::Reviewing));
        assert!(serde_json::from_str::<ReportFilter>(r#"{"status":"closed"}"#).is_err());
    }
}
