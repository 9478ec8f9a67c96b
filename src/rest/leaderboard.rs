use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::get,
    Router,
};

use super::response::ApiResponse;
use super::AppState;
use crate::error::Result;
use crate::query::{
    clamp_limit, CitizenPage, CitizenSort, CsrRow, LeaderboardEngine, LeaderboardQuery,
    CITIZEN_DEFAULT_LIMIT, CITIZEN_LIST_DEFAULT_LIMIT, CITIZEN_LIST_MAX_LIMIT, CITIZEN_MAX_LIMIT,
    CSR_DEFAULT_LIMIT, CSR_MAX_LIMIT,
};

/// Leaderboards are public.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/citizens", get(citizens))
        .route("/citizens/list", get(citizen_list))
        .route("/csr", get(csr_leaderboard))
}

async fn citizen_page(
    state: &AppState,
    query: &LeaderboardQuery,
    default_sort: CitizenSort,
    default_limit: usize,
    max_limit: usize,
) -> Result<CitizenPage> {
    let sort = CitizenSort::parse(query.sort.as_deref(), default_sort);
    let limit = clamp_limit(query.limit, default_limit, max_limit);
    let offset = query.offset.unwrap_or(0);

    let engine = LeaderboardEngine::new(&state.storage).await?;
    let (rows, total) = futures::try_join!(engine.citizens(sort, offset, limit), engine.citizen_total())?;

    Ok(CitizenPage {
        total,
        offset,
        limit,
        sort,
        rows,
    })
}

#[utoipa::path(
    get,
    path = "/api/v1/leaderboard/citizens",
    tag = "leaderboard",
    params(LeaderboardQuery),
    responses((status = 200, description = "Citizens ranked by points (default) or report count", body = CitizenPage))
)]
pub async fn citizens(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<ApiResponse<CitizenPage>> {
    let page = citizen_page(
        &state,
        &query,
        CitizenSort::Points,
        CITIZEN_DEFAULT_LIMIT,
        CITIZEN_MAX_LIMIT,
    )
    .await?;
    Ok(ApiResponse::ok(page, "Citizen leaderboard fetched successfully"))
}

#[utoipa::path(
    get,
    path = "/api/v1/leaderboard/citizens/list",
    tag = "leaderboard",
    params(LeaderboardQuery),
    responses((status = 200, description = "Longer citizen listing, ranked by report count by default", body = CitizenPage))
)]
pub async fn citizen_list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<ApiResponse<CitizenPage>> {
    let page = citizen_page(
        &state,
        &query,
        CitizenSort::Reports,
        CITIZEN_LIST_DEFAULT_LIMIT,
        CITIZEN_LIST_MAX_LIMIT,
    )
    .await?;
    Ok(ApiResponse::ok(page, "Citizen list fetched successfully"))
}

#[utoipa::path(
    get,
    path = "/api/v1/leaderboard/csr",
    tag = "leaderboard",
    params(LeaderboardQuery),
    responses((status = 200, description = "Sponsors ranked by 0.6 x donations + 100 x problems sponsored", body = [CsrRow]))
)]
pub async fn csr_leaderboard(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<ApiResponse<Vec<CsrRow>>> {
    let limit = clamp_limit(query.limit, CSR_DEFAULT_LIMIT, CSR_MAX_LIMIT);
    let engine = LeaderboardEngine::new(&state.storage).await?;
    let rows = engine.csrs(limit).await?;
    Ok(ApiResponse::ok(rows, "CSR leaderboard fetched successfully"))
}
