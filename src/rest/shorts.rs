use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, Query, State},
    middleware,
    routing::{delete, get, post},
    Extension, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use super::middleware::auth_middleware;
use super::multipart::FormData;
use super::reports::PageQuery;
use super::response::ApiResponse;
use super::AppState;
use crate::error::{ApiError, Result};
use crate::media::MediaKind;
use crate::models::{Principal, Shorts};
use crate::workflow::Vote;

pub const SHORTS_DEFAULT_LIMIT: usize = 10;
pub const SHORTS_MAX_LIMIT: usize = 50;

/// Multipart body of `POST /shorts`.
#[derive(Deserialize, ToSchema)]
pub struct UploadShortsForm {
    pub title: String,
    pub description: String,
    #[schema(value_type = String, format = Binary)]
    pub video: Vec<u8>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShortsFeed {
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub total_pages: usize,
    pub has_more: bool,
    pub shorts: Vec<Shorts>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VoteTally {
    pub upvotes: usize,
    pub downvotes: usize,
    pub shorts: Shorts,
}

impl From<Shorts> for VoteTally {
    fn from(shorts: Shorts) -> Self {
        Self {
            upvotes: shorts.upvotes.len(),
            downvotes: shorts.downvotes.len(),
            shorts,
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/",
            post(upload_shorts)
                .layer(state.upload_limit())
                .get(shorts_feed),
        )
        .route("/:shortsId", delete(delete_shorts))
        .route("/:shortsId/share", post(share_shorts))
        .route("/:shortsId/upvote", post(upvote_shorts))
        .route("/:shortsId/downvote", post(downvote_shorts))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

#[utoipa::path(
    post,
    path = "/api/v1/shorts",
    tag = "shorts",
    security(("bearer_auth" = [])),
    request_body(content = UploadShortsForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Shorts uploaded", body = Shorts),
        (status = 400, description = "Missing field or not a video"),
    )
)]
pub async fn upload_shorts(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    multipart: Multipart,
) -> Result<ApiResponse<Shorts>> {
    let user = principal.user()?;
    let mut form = FormData::read(multipart).await?;
    let title = form.required("title")?.to_string();
    let description = form.required("description")?.to_string();
    let file = form
        .take_file("video")
        .ok_or_else(|| ApiError::validation("Video file is required"))?;
    file.expect_kind(MediaKind::Video)?;

    let video = state
        .media
        .upload(MediaKind::Video, &file.file_name, file.bytes)
        .await?;

    let now = Utc::now();
    let shorts = Shorts {
        id: Uuid::new_v4().to_string(),
        title,
        description,
        video,
        posted_by: user.id.clone(),
        upvotes: vec![],
        downvotes: vec![],
        shares: 0,
        created_at: now,
        updated_at: now,
    };

    if let Err(e) = state.storage.create_shorts(&shorts) {
        state.discard(MediaKind::Video, &shorts.video).await;
        return Err(e);
    }

    info!(shorts_id = %shorts.id, user_id = %user.id, "shorts uploaded");
    Ok(ApiResponse::created(shorts, "Shorts uploaded successfully"))
}

#[utoipa::path(
    get,
    path = "/api/v1/shorts",
    tag = "shorts",
    security(("bearer_auth" = [])),
    params(PageQuery),
    responses((status = 200, description = "Shorts newest first", body = ShortsFeed))
)]
pub async fn shorts_feed(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PageQuery>,
) -> Result<ApiResponse<ShortsFeed>> {
    let (page, limit, skip) = query.resolve(SHORTS_DEFAULT_LIMIT, SHORTS_MAX_LIMIT);

    let mut all = state.storage.shorts.all()?;
    all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    let total = all.len();
    let shorts: Vec<Shorts> = all.into_iter().skip(skip).take(limit).collect();

    Ok(ApiResponse::ok(
        ShortsFeed {
            page,
            limit,
            total,
            total_pages: total.div_ceil(limit),
            has_more: skip + shorts.len() < total,
            shorts,
        },
        "Shorts fetched successfully",
    ))
}

#[utoipa::path(
    post,
    path = "/api/v1/shorts/{shortsId}/share",
    tag = "shorts",
    security(("bearer_auth" = [])),
    params(("shortsId" = String, Path, description = "Shorts id")),
    responses(
        (status = 200, description = "Share counted", body = Shorts),
        (status = 404, description = "Unknown shorts"),
    )
)]
pub async fn share_shorts(
    State(state): State<Arc<AppState>>,
    Path(shorts_id): Path<String>,
) -> Result<ApiResponse<Shorts>> {
    let shorts = state.storage.share_shorts(&shorts_id)?;
    Ok(ApiResponse::ok(shorts, "Shorts shared successfully"))
}

async fn vote(state: &AppState, principal: &Principal, shorts_id: &str, vote: Vote) -> Result<VoteTally> {
    let user = principal.user()?;
    let shorts = state.storage.vote_shorts(shorts_id, &user.id, vote)?;
    Ok(VoteTally::from(shorts))
}

#[utoipa::path(
    post,
    path = "/api/v1/shorts/{shortsId}/upvote",
    tag = "shorts",
    security(("bearer_auth" = [])),
    params(("shortsId" = String, Path, description = "Shorts id")),
    responses(
        (status = 200, description = "Upvote toggled; any downvote by the caller is removed", body = VoteTally),
        (status = 404, description = "Unknown shorts"),
    )
)]
pub async fn upvote_shorts(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(shorts_id): Path<String>,
) -> Result<ApiResponse<VoteTally>> {
    let tally = vote(&state, &principal, &shorts_id, Vote::Up).await?;
    Ok(ApiResponse::ok(tally, "Upvote updated"))
}

#[utoipa::path(
    post,
    path = "/api/v1/shorts/{shortsId}/downvote",
    tag = "shorts",
    security(("bearer_auth" = [])),
    params(("shortsId" = String, Path, description = "Shorts id")),
    responses(
        (status = 200, description = "Downvote toggled; any upvote by the caller is removed", body = VoteTally),
        (status = 404, description = "Unknown shorts"),
    )
)]
pub async fn downvote_shorts(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(shorts_id): Path<String>,
) -> Result<ApiResponse<VoteTally>> {
    let tally = vote(&state, &principal, &shorts_id, Vote::Down).await?;
    Ok(ApiResponse::ok(tally, "Downvote updated"))
}

#[utoipa::path(
    delete,
    path = "/api/v1/shorts/{shortsId}",
    tag = "shorts",
    security(("bearer_auth" = [])),
    params(("shortsId" = String, Path, description = "Shorts id")),
    responses(
        (status = 200, description = "Shorts and its video deleted"),
        (status = 403, description = "Caller did not post it"),
        (status = 404, description = "Unknown shorts"),
    )
)]
pub async fn delete_shorts(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(shorts_id): Path<String>,
) -> Result<ApiResponse<serde_json::Value>> {
    let user = principal.user()?;
    let shorts = state
        .storage
        .shorts
        .get(&shorts_id)?
        .ok_or_else(|| ApiError::not_found("Shorts not found"))?;

    if shorts.posted_by != user.id {
        return Err(ApiError::forbidden("You are not authorized to delete this shorts"));
    }

    state.discard(MediaKind::Video, &shorts.video).await;
    state.storage.delete_shorts(&shorts.id, &user.id)?;

    info!(shorts_id = %shorts.id, user_id = %user.id, "shorts deleted");
    Ok(ApiResponse::ok(
        serde_json::json!({ "shortsId": shorts.id }),
        "Shorts deleted successfully",
    ))
}
