use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, Query, State},
    middleware,
    routing::{delete, get, patch, post},
    Extension, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::middleware::auth_middleware;
use super::multipart::FormData;
use super::response::{ApiJson, ApiResponse};
use super::AppState;
use crate::error::{ApiError, Result};
use crate::media::MediaKind;
use crate::models::{GeoPoint, Principal, Report, ReportStatus};
use crate::workflow::{check_coordinate, distance_km, parse_coordinate};

pub const FEED_DEFAULT_LIMIT: usize = 20;
pub const FEED_MAX_LIMIT: usize = 50;
pub const NEARBY_DEFAULT_RADIUS_KM: f64 = 5.0;
pub const NEARBY_MAX_RADIUS_KM: f64 = 50.0;

/// Multipart body of `POST /submitReport`.
#[derive(Deserialize, ToSchema)]
pub struct SubmitReportForm {
    pub description: String,
    pub department: String,
    pub category: String,
    pub latitude: f64,
    pub longitude: f64,
    #[schema(value_type = String, format = Binary)]
    pub image: Vec<u8>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDescriptionRequest {
    pub old_description: Option<String>,
    pub new_description: Option<String>,
}

#[derive(Deserialize, IntoParams)]
pub struct PageQuery {
    /// 1-based page number
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

impl PageQuery {
    /// `(page, limit, skip)` with the page at least 1 and the limit in `1..=max`.
    pub fn resolve(&self, default_limit: usize, max_limit: usize) -> (usize, usize, usize) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self.limit.unwrap_or(default_limit).clamp(1, max_limit);
        (page, limit, (page - 1).saturating_mul(limit))
    }
}

#[derive(Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct NearbyQuery {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    /// Search radius in kilometres, capped at 50
    pub radius_km: Option<f64>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReportFeed {
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub has_more: bool,
    pub reports: Vec<Report>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NearbyReport {
    pub distance_km: f64,
    pub report: Report,
}

pub fn router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/submitReport", post(submit_report).layer(state.upload_limit()))
        .route("/updateDescription/:reportId", patch(update_description))
        .route("/deleteReport/:reportId", delete(delete_report))
        .route("/feed", get(feed))
        .route("/mine", get(my_reports))
        .route("/nearby", get(nearby))
        .route("/:reportId", get(get_report))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

#[utoipa::path(
    post,
    path = "/api/v1/report/submitReport",
    tag = "reports",
    security(("bearer_auth" = [])),
    request_body(content = SubmitReportForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Report created", body = Report),
        (status = 400, description = "Missing field, bad coordinates or no image"),
        (status = 502, description = "Image upload or address lookup failed"),
    )
)]
pub async fn submit_report(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    multipart: Multipart,
) -> Result<ApiResponse<Report>> {
    let user = principal.user()?;
    let mut form = FormData::read(multipart).await?;

    let description = form.required("description")?.to_string();
    let department = form.required("department")?.to_string();
    let category = form.required("category")?.to_string();
    let latitude = parse_coordinate(form.required("latitude")?, "latitude", 90.0)?;
    let longitude = parse_coordinate(form.required("longitude")?, "longitude", 180.0)?;

    let image = form
        .take_file("image")
        .ok_or_else(|| ApiError::validation("Image is required"))?;
    image.expect_kind(MediaKind::Image)?;

    let address = state
        .geocoder
        .reverse(latitude, longitude)
        .await?
        .ok_or_else(|| ApiError::upstream("Address not found for these coordinates"))?;

    let photo = state
        .media
        .upload(MediaKind::Image, &image.file_name, image.bytes)
        .await?;

    let now = Utc::now();
    let report = Report {
        id: Uuid::new_v4().to_string(),
        description,
        department,
        category,
        reported_by: user.id.clone(),
        photos: vec![photo],
        location: GeoPoint::new(longitude, latitude),
        address,
        status: ReportStatus::Reported,
        resolved_at: None,
        tender: None,
        created_at: now,
        updated_at: now,
    };

    if let Err(e) = state.storage.reports.insert(&report.id, &report) {
        for photo in &report.photos {
            state.discard(MediaKind::Image, photo).await;
        }
        return Err(e);
    }

    info!(report_id = %report.id, user_id = %user.id, category = %report.category, "report submitted");
    Ok(ApiResponse::created(report, "Report submitted successfully"))
}

#[utoipa::path(
    patch,
    path = "/api/v1/report/updateDescription/{reportId}",
    tag = "reports",
    security(("bearer_auth" = [])),
    params(("reportId" = String, Path, description = "Report id")),
    request_body = UpdateDescriptionRequest,
    responses(
        (status = 200, description = "Description updated", body = Report),
        (status = 400, description = "Blank, unchanged or stale description"),
        (status = 404, description = "Report not found or not owned by the caller"),
    )
)]
pub async fn update_description(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(report_id): Path<String>,
    ApiJson(payload): ApiJson<UpdateDescriptionRequest>,
) -> Result<ApiResponse<Report>> {
    let user = principal.user()?;
    let old_description = payload.old_description.unwrap_or_default();
    let new_description = payload.new_description.unwrap_or_default();

    let report = state.storage.update_description(
        &report_id,
        &user.id,
        &old_description,
        &new_description,
    )?;
    Ok(ApiResponse::ok(report, "Description updated successfully"))
}

#[utoipa::path(
    delete,
    path = "/api/v1/report/deleteReport/{reportId}",
    tag = "reports",
    security(("bearer_auth" = [])),
    params(("reportId" = String, Path, description = "Report id")),
    responses(
        (status = 200, description = "Report and its photos deleted"),
        (status = 404, description = "Report not found or not owned by the caller"),
    )
)]
pub async fn delete_report(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(report_id): Path<String>,
) -> Result<ApiResponse<serde_json::Value>> {
    let user = principal.user()?;
    let report = state
        .storage
        .reports
        .get(&report_id)?
        .filter(|report| report.reported_by == user.id)
        .ok_or_else(|| ApiError::not_found("Report not found or not authorized"))?;

    for photo in &report.photos {
        state.media.destroy(MediaKind::Image, &photo.public_id).await?;
    }
    state.storage.reports.remove(&report.id)?;

    info!(report_id = %report.id, user_id = %user.id, "report deleted");
    Ok(ApiResponse::ok(
        serde_json::json!({ "reportId": report.id }),
        "Report deleted successfully",
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/report/{reportId}",
    tag = "reports",
    security(("bearer_auth" = [])),
    params(("reportId" = String, Path, description = "Report id")),
    responses(
        (status = 200, description = "The report", body = Report),
        (status = 404, description = "Unknown report"),
    )
)]
pub async fn get_report(
    State(state): State<Arc<AppState>>,
    Path(report_id): Path<String>,
) -> Result<ApiResponse<Report>> {
    let report = state
        .storage
        .reports
        .get(&report_id)?
        .ok_or_else(|| ApiError::not_found("Report not found"))?;
    Ok(ApiResponse::ok(report, "Report fetched successfully"))
}

#[utoipa::path(
    get,
    path = "/api/v1/report/mine",
    tag = "reports",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Caller's reports, newest first", body = [Report]))
)]
pub async fn my_reports(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Result<ApiResponse<Vec<Report>>> {
    let user = principal.user()?;
    let reports = state.storage.reports_by(&user.id)?;
    Ok(ApiResponse::ok(reports, "Reports fetched successfully"))
}

#[utoipa::path(
    get,
    path = "/api/v1/report/feed",
    tag = "reports",
    security(("bearer_auth" = [])),
    params(PageQuery),
    responses((status = 200, description = "All reports, newest first", body = ReportFeed))
)]
pub async fn feed(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PageQuery>,
) -> Result<ApiResponse<ReportFeed>> {
    let (page, limit, skip) = query.resolve(FEED_DEFAULT_LIMIT, FEED_MAX_LIMIT);
    let all = state.storage.reports_newest_first()?;
    let total = all.len();
    let reports: Vec<Report> = all.into_iter().skip(skip).take(limit).collect();

    Ok(ApiResponse::ok(
        ReportFeed {
            page,
            limit,
            total,
            has_more: skip + reports.len() < total,
            reports,
        },
        "Feed fetched successfully",
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/report/nearby",
    tag = "reports",
    security(("bearer_auth" = [])),
    params(NearbyQuery),
    responses(
        (status = 200, description = "Reports within the radius, nearest first", body = [NearbyReport]),
        (status = 400, description = "Missing or out-of-range coordinates"),
    )
)]
pub async fn nearby(
    State(state): State<Arc<AppState>>,
    Query(query): Query<NearbyQuery>,
) -> Result<ApiResponse<Vec<NearbyReport>>> {
    let (Some(lat), Some(lng)) = (query.lat, query.lng) else {
        return Err(ApiError::validation("lat and lng are required"));
    };
    let latitude = check_coordinate(lat, "lat", 90.0)?;
    let longitude = check_coordinate(lng, "lng", 180.0)?;
    let radius = query
        .radius_km
        .filter(|radius| radius.is_finite() && *radius > 0.0)
        .unwrap_or(NEARBY_DEFAULT_RADIUS_KM)
        .min(NEARBY_MAX_RADIUS_KM);

    let mut hits: Vec<NearbyReport> = state
        .storage
        .reports
        .all()?
        .into_iter()
        .map(|report| NearbyReport {
            distance_km: distance_km(&report.location, latitude, longitude),
            report,
        })
        .filter(|hit| hit.distance_km <= radius)
        .collect();
    hits.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));

    Ok(ApiResponse::ok(hits, "Nearby reports fetched successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_query_bounds() {
        let query = PageQuery { page: Some(0), limit: Some(500) };
        assert_eq!(query.resolve(FEED_DEFAULT_LIMIT, FEED_MAX_LIMIT), (1, 50, 0));

        let query = PageQuery { page: Some(3), limit: None };
        assert_eq!(query.resolve(FEED_DEFAULT_LIMIT, FEED_MAX_LIMIT), (3, 20, 40));
    }

    #[test]
    fn huge_page_saturates_skip() {
        let query = PageQuery { page: Some(usize::MAX), limit: Some(50) };
        assert_eq!(query.resolve(FEED_DEFAULT_LIMIT, FEED_MAX_LIMIT), (usize::MAX, 50, usize::MAX));
    }
}
