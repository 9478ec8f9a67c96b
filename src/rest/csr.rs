use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::header,
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Extension, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use super::middleware::{auth_middleware, session_cookie};
use super::response::{required, ApiJson, ApiResponse};
use super::AppState;
use crate::error::{ApiError, Result};
use crate::models::{Csr, CsrProfile, Principal, Report};

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterCsrRequest {
    pub company_name: Option<String>,
    pub company_email: Option<String>,
    pub company_description: Option<String>,
    pub password: Option<String>,
    /// Donations pledged so far
    pub donations: Option<f64>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CsrLoginRequest {
    pub company_email: Option<String>,
    pub password: Option<String>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CsrSession {
    pub csr: CsrProfile,
    pub access_token: String,
}

pub fn router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let authed = Router::new()
        .route("/tenders", get(list_tenders))
        .route("/tenders/:tenderId/accept", post(accept_tender))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware));

    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .merge(authed)
}

#[utoipa::path(
    post,
    path = "/api/v1/csr/register",
    tag = "csr",
    request_body = RegisterCsrRequest,
    responses(
        (status = 201, description = "Sponsor registered", body = CsrSession),
        (status = 400, description = "Missing field or negative donations"),
        (status = 409, description = "Company name or email taken"),
    )
)]
pub async fn register(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<RegisterCsrRequest>,
) -> Result<ApiResponse<CsrSession>> {
    const MISSING: &str = "All fields are required";
    let donations = payload.donations.unwrap_or(0.0);
    if !donations.is_finite() || donations < 0.0 {
        return Err(ApiError::validation("Donations cannot be negative"));
    }

    let now = Utc::now();
    let csr = Csr {
        id: Uuid::new_v4().to_string(),
        company_name: required(&payload.company_name, MISSING)?.to_string(),
        company_email: required(&payload.company_email, MISSING)?.to_lowercase(),
        company_description: required(&payload.company_description, MISSING)?.to_string(),
        password_hash: state
            .auth
            .hash_password(required(&payload.password, MISSING)?)?,
        logo: None,
        total_donations: donations,
        issues_sponsored: vec![],
        last_donation: (donations > 0.0).then_some(now),
        created_at: now,
        updated_at: now,
    };

    state.storage.create_csr(&csr)?;
    let access_token = state.auth.create_csr_token(&csr.id)?;

    info!(csr_id = %csr.id, company = %csr.company_name, "CSR sponsor registered");
    Ok(ApiResponse::created(
        CsrSession {
            csr: CsrProfile::from(&csr),
            access_token,
        },
        "Company registered successfully",
    ))
}

#[utoipa::path(
    post,
    path = "/api/v1/csr/login",
    tag = "csr",
    request_body = CsrLoginRequest,
    responses(
        (status = 200, description = "Logged in; also sets the accessToken cookie", body = CsrSession),
        (status = 401, description = "Wrong password"),
        (status = 404, description = "Unknown company"),
    )
)]
pub async fn login(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<CsrLoginRequest>,
) -> Result<impl IntoResponse> {
    let email = required(&payload.company_email, "Company email and password are required")?;
    let password = required(&payload.password, "Company email and password are required")?;

    let csr = state
        .storage
        .find_csr_by_email(email)?
        .ok_or_else(|| ApiError::not_found("Company not found"))?;

    if !state.auth.verify_password(password, &csr.password_hash) {
        return Err(ApiError::unauthorized("Invalid password"));
    }

    let access_token = state.auth.create_csr_token(&csr.id)?;
    let cookie = session_cookie(&access_token, state.auth.expiry_secs());

    Ok((
        [(header::SET_COOKIE, cookie)],
        ApiResponse::ok(
            CsrSession {
                csr: CsrProfile::from(&csr),
                access_token,
            },
            "Company logged in successfully",
        ),
    ))
}

#[utoipa::path(
    get,
    path = "/api/v1/csr/tenders",
    tag = "csr",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Reports with an open tender", body = [Report]))
)]
pub async fn list_tenders(State(state): State<Arc<AppState>>) -> Result<ApiResponse<Vec<Report>>> {
    let tenders = state.storage.released_tenders()?;
    Ok(ApiResponse::ok(tenders, "Released tenders fetched successfully"))
}

#[utoipa::path(
    post,
    path = "/api/v1/csr/tenders/{tenderId}/accept",
    tag = "csr",
    security(("bearer_auth" = [])),
    params(("tenderId" = String, Path, description = "Id of the report carrying the tender")),
    responses(
        (status = 200, description = "Tender accepted", body = Report),
        (status = 403, description = "Caller is not a CSR sponsor"),
        (status = 404, description = "No tender on this report"),
        (status = 409, description = "Tender already accepted"),
    )
)]
pub async fn accept_tender(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(tender_id): Path<String>,
) -> Result<ApiResponse<Report>> {
    let csr = principal.csr()?;
    let report = state.storage.accept_tender(&tender_id, &csr.id)?;

    info!(report_id = %report.id, csr_id = %csr.id, "tender accepted");
    Ok(ApiResponse::ok(report, "Tender request accepted successfully"))
}
