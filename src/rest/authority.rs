use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::header,
    middleware,
    response::IntoResponse,
    routing::{get, patch, post},
    Extension, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::middleware::{auth_middleware, session_cookie};
use super::response::{required, ApiJson, ApiResponse};
use super::AppState;
use crate::error::{ApiError, Result};
use crate::models::{Authority, AuthorityProfile, Principal, Report, ReportStatus, ReporterSummary};

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterAuthorityRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub designation: Option<String>,
    pub category: Option<String>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthorityLoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseTenderRequest {
    pub tender_details: Option<String>,
}

#[derive(Deserialize, IntoParams)]
pub struct IssueFilter {
    /// `reported` or `resolved`
    pub status: Option<ReportStatus>,
    pub category: Option<String>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthoritySession {
    pub authority: AuthorityProfile,
    pub access_token: String,
}

/// A report as listed for triage, with its reporter resolved.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub report: Report,
    pub reporter: Option<ReporterSummary>,
}

pub fn router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let authed = Router::new()
        .route("/issues", get(list_issues))
        .route("/issues/:reportId/resolve", patch(resolve_issue))
        .route("/issues/:reportId/release-tender", post(release_tender))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware));

    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .merge(authed)
}

#[utoipa::path(
    post,
    path = "/api/v1/authority/register",
    tag = "authority",
    request_body = RegisterAuthorityRequest,
    responses(
        (status = 201, description = "Authority registered", body = AuthoritySession),
        (status = 400, description = "Missing field"),
        (status = 409, description = "Email taken"),
    )
)]
pub async fn register(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<RegisterAuthorityRequest>,
) -> Result<ApiResponse<AuthoritySession>> {
    const MISSING: &str = "All fields are required";
    let now = Utc::now();
    let authority = Authority {
        id: Uuid::new_v4().to_string(),
        name: required(&payload.name, MISSING)?.to_string(),
        email: required(&payload.email, MISSING)?.to_lowercase(),
        password_hash: state
            .auth
            .hash_password(required(&payload.password, MISSING)?)?,
        designation: required(&payload.designation, MISSING)?.to_string(),
        category: required(&payload.category, MISSING)?.to_string(),
        created_at: now,
        updated_at: now,
    };

    state.storage.create_authority(&authority)?;
    let access_token = state.auth.create_access_token(&authority.id)?;

    info!(authority_id = %authority.id, category = %authority.category, "authority registered");
    Ok(ApiResponse::created(
        AuthoritySession {
            authority: AuthorityProfile::from(&authority),
            access_token,
        },
        "Authority registered successfully",
    ))
}

#[utoipa::path(
    post,
    path = "/api/v1/authority/login",
    tag = "authority",
    request_body = AuthorityLoginRequest,
    responses(
        (status = 200, description = "Logged in; also sets the accessToken cookie", body = AuthoritySession),
        (status = 401, description = "Wrong password"),
        (status = 404, description = "Unknown authority"),
    )
)]
pub async fn login(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<AuthorityLoginRequest>,
) -> Result<impl IntoResponse> {
    let email = required(&payload.email, "Email and password are required")?;
    let password = required(&payload.password, "Email and password are required")?;

    let authority = state
        .storage
        .find_authority_by_email(email)?
        .ok_or_else(|| ApiError::not_found("Authority not found"))?;

    if !state.auth.verify_password(password, &authority.password_hash) {
        return Err(ApiError::unauthorized("Invalid password"));
    }

    let access_token = state.auth.create_access_token(&authority.id)?;
    let cookie = session_cookie(&access_token, state.auth.expiry_secs());

    Ok((
        [(header::SET_COOKIE, cookie)],
        ApiResponse::ok(
            AuthoritySession {
                authority: AuthorityProfile::from(&authority),
                access_token,
            },
            "Authority logged in successfully",
        ),
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/authority/issues",
    tag = "authority",
    security(("bearer_auth" = [])),
    params(IssueFilter),
    responses(
        (status = 200, description = "Reports newest first, with reporter details", body = [Issue]),
        (status = 403, description = "Caller is not an authority"),
    )
)]
pub async fn list_issues(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Query(filter): Query<IssueFilter>,
) -> Result<ApiResponse<Vec<Issue>>> {
    principal.authority()?;

    let reports: Vec<Report> = state
        .storage
        .reports_newest_first()?
        .into_iter()
        .filter(|report| filter.status.map_or(true, |status| report.status == status))
        .filter(|report| {
            filter
                .category
                .as_deref()
                .map_or(true, |category| report.category.eq_ignore_ascii_case(category))
        })
        .collect();

    let mut reporters: HashMap<String, Option<ReporterSummary>> = HashMap::new();
    let mut issues = Vec::with_capacity(reports.len());
    for report in reports {
        let reporter = match reporters.get(&report.reported_by) {
            Some(cached) => cached.clone(),
            None => {
                let summary = state
                    .storage
                    .users
                    .get(&report.reported_by)?
                    .map(|user| ReporterSummary::from(&user));
                reporters.insert(report.reported_by.clone(), summary.clone());
                summary
            }
        };
        issues.push(Issue { report, reporter });
    }

    Ok(ApiResponse::ok(issues, "Issues fetched successfully"))
}

#[utoipa::path(
    patch,
    path = "/api/v1/authority/issues/{reportId}/resolve",
    tag = "authority",
    security(("bearer_auth" = [])),
    params(("reportId" = String, Path, description = "Report id")),
    responses(
        (status = 200, description = "Resolved; the reporter gains 5 points", body = Report),
        (status = 404, description = "Unknown report"),
        (status = 409, description = "Already resolved"),
    )
)]
pub async fn resolve_issue(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(report_id): Path<String>,
) -> Result<ApiResponse<Report>> {
    let authority = principal.authority()?;
    let report = state.storage.resolve_report(&report_id)?;

    info!(report_id = %report.id, authority_id = %authority.id, "report resolved");
    Ok(ApiResponse::ok(report, "Report marked as resolved"))
}

#[utoipa::path(
    post,
    path = "/api/v1/authority/issues/{reportId}/release-tender",
    tag = "authority",
    security(("bearer_auth" = [])),
    params(("reportId" = String, Path, description = "Report id")),
    request_body = ReleaseTenderRequest,
    responses(
        (status = 200, description = "Tender released", body = Report),
        (status = 400, description = "Blank tender details"),
        (status = 404, description = "Unknown report"),
        (status = 409, description = "Tender already accepted"),
    )
)]
pub async fn release_tender(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(report_id): Path<String>,
    ApiJson(payload): ApiJson<ReleaseTenderRequest>,
) -> Result<ApiResponse<Report>> {
    let authority = principal.authority()?;
    let details = required(&payload.tender_details, "Tender details are required")?;
    let report = state
        .storage
        .release_tender(&report_id, &authority.id, details)?;

    info!(report_id = %report.id, authority_id = %authority.id, "tender released");
    Ok(ApiResponse::ok(report, "Tender released successfully"))
}
