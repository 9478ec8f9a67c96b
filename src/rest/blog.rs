use std::sync::Arc;

use axum::{extract::State, routing::get, Router};
use chrono::{DateTime, Duration, Months, Utc};

use super::response::ApiResponse;
use super::AppState;
use crate::error::{ApiError, Result};
use crate::models::{Report, ReportStatus};

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/stale-reports", get(stale_reports))
}

/// Reports still open after a calendar month count as stale.
fn stale_cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
    now.checked_sub_months(Months::new(1))
        .unwrap_or_else(|| now - Duration::days(30))
}

pub fn stale_reports_at(mut reports: Vec<Report>, now: DateTime<Utc>) -> Vec<Report> {
    let cutoff = stale_cutoff(now);
    reports.retain(|report| report.status == ReportStatus::Reported && report.created_at <= cutoff);
    reports.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    reports
}

#[utoipa::path(
    get,
    path = "/api/v1/blog/stale-reports",
    tag = "blog",
    responses(
        (status = 200, description = "Unresolved reports older than a month, newest first", body = [Report]),
        (status = 404, description = "Nothing stale"),
    )
)]
pub async fn stale_reports(State(state): State<Arc<AppState>>) -> Result<ApiResponse<Vec<Report>>> {
    let reports = stale_reports_at(state.storage.reports.all()?, Utc::now());
    if reports.is_empty() {
        return Err(ApiError::not_found("No pending reports older than one month found"));
    }
    Ok(ApiResponse::ok(reports, "Stale reports fetched successfully"))
}
