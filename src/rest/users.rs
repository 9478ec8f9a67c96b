use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, State},
    http::header,
    middleware,
    response::IntoResponse,
    routing::{get, patch, post},
    Extension, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use super::middleware::{auth_middleware, cleared_cookie, session_cookie};
use super::multipart::FormData;
use super::response::{required, ApiJson, ApiResponse};
use super::AppState;
use crate::error::{ApiError, Result};
use crate::media::MediaKind;
use crate::models::{
    AuthorityProfile, CsrProfile, Principal, Report, StoredMedia, User, UserProfile,
};

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub old_password: Option<String>,
    pub new_password: Option<String>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub full_name: Option<String>,
    pub email: Option<String>,
}

/// Multipart body of `POST /register`.
#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterUserForm {
    pub full_name: String,
    pub username: String,
    pub email: String,
    pub password: String,
    #[schema(value_type = Option<String>, format = Binary)]
    pub profile_photo: Option<Vec<u8>>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserSession {
    pub user: UserProfile,
    pub access_token: String,
}

/// Whoever the token resolved to.
#[derive(Serialize, ToSchema)]
#[serde(tag = "kind", content = "profile", rename_all = "lowercase")]
pub enum PrincipalView {
    User(UserProfile),
    Authority(AuthorityProfile),
    Csr(CsrProfile),
}

impl From<&Principal> for PrincipalView {
    fn from(principal: &Principal) -> Self {
        match principal {
            Principal::User(user) => PrincipalView::User(user.into()),
            Principal::Authority(authority) => PrincipalView::Authority(authority.into()),
            Principal::Csr(csr) => PrincipalView::Csr(csr.into()),
        }
    }
}

/// Public channel page of a citizen.
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChannelProfile {
    pub id: String,
    pub full_name: String,
    pub username: String,
    pub profile_photo: Option<StoredMedia>,
    pub points: i64,
    pub total_reports: usize,
    pub reports: Vec<Report>,
    pub shorts: Vec<String>,
    pub created_at: DateTime<Utc>,
}

pub fn router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let authed = Router::new()
        .route("/logout", post(logout))
        .route("/change-password", patch(change_password))
        .route("/update-profile", patch(update_profile))
        .route("/profile-photo", patch(update_profile_photo).layer(state.upload_limit()))
        .route("/current-user", get(current_user))
        .route("/c/:username", get(channel_profile))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/register", post(register).layer(state.upload_limit()))
        .route("/login", post(login))
        .merge(authed)
}

#[utoipa::path(
    post,
    path = "/api/v1/users/register",
    tag = "users",
    request_body(content = RegisterUserForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "User registered", body = UserProfile),
        (status = 400, description = "Missing field"),
        (status = 409, description = "Username or email taken"),
    )
)]
pub async fn register(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<ApiResponse<UserProfile>> {
    let mut form = FormData::read(multipart).await?;
    let full_name = form.required("fullName")?.to_string();
    let username = form.required("username")?.to_lowercase();
    let email = form.required("email")?.to_lowercase();
    let password_hash = state.auth.hash_password(form.required("password")?)?;

    let profile_photo = match form.take_file("profilePhoto") {
        Some(file) => {
            file.expect_kind(MediaKind::Image)?;
            Some(
                state
                    .media
                    .upload(MediaKind::Image, &file.file_name, file.bytes)
                    .await?,
            )
        }
        None => None,
    };

    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4().to_string(),
        full_name,
        username,
        email,
        password_hash,
        profile_photo,
        points: 0,
        shorts: vec![],
        created_at: now,
        updated_at: now,
    };

    if let Err(e) = state.storage.create_user(&user) {
        if let Some(photo) = &user.profile_photo {
            state.discard(MediaKind::Image, photo).await;
        }
        return Err(e);
    }

    info!(user_id = %user.id, username = %user.username, "user registered");
    Ok(ApiResponse::created(UserProfile::from(&user), "User registered successfully"))
}

#[utoipa::path(
    post,
    path = "/api/v1/users/login",
    tag = "users",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in; also sets the accessToken cookie", body = UserSession),
        (status = 401, description = "Wrong password"),
        (status = 404, description = "Unknown user"),
    )
)]
pub async fn login(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse> {
    let identifier = required(&payload.username, "Username or email is required")
        .or_else(|_| required(&payload.email, "Username or email is required"))?;
    let password = required(&payload.password, "Password is required")?;

    let user = state
        .storage
        .find_user_by_login(identifier)?
        .ok_or_else(|| ApiError::not_found("User does not exist"))?;

    if !state.auth.verify_password(password, &user.password_hash) {
        return Err(ApiError::unauthorized("Invalid user credentials"));
    }

    let access_token = state.auth.create_access_token(&user.id)?;
    let cookie = session_cookie(&access_token, state.auth.expiry_secs());

    Ok((
        [(header::SET_COOKIE, cookie)],
        ApiResponse::ok(
            UserSession {
                user: UserProfile::from(&user),
                access_token,
            },
            "User logged in successfully",
        ),
    ))
}

#[utoipa::path(
    post,
    path = "/api/v1/users/logout",
    tag = "users",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "Cookie cleared"))
)]
pub async fn logout(Extension(principal): Extension<Principal>) -> impl IntoResponse {
    info!(id = principal.id(), "logged out");
    (
        [(header::SET_COOKIE, cleared_cookie())],
        ApiResponse::ok(serde_json::json!({}), "User logged out"),
    )
}

#[utoipa::path(
    patch,
    path = "/api/v1/users/change-password",
    tag = "users",
    security(("bearer_auth" = [])),
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed"),
        (status = 400, description = "Old password wrong or new one unchanged"),
    )
)]
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    ApiJson(payload): ApiJson<ChangePasswordRequest>,
) -> Result<ApiResponse<serde_json::Value>> {
    let user = principal.user()?;
    let old_password = required(&payload.old_password, "Old password is required")?;
    let new_password = required(&payload.new_password, "New password is required")?;

    if !state.auth.verify_password(old_password, &user.password_hash) {
        return Err(ApiError::validation("Invalid old password"));
    }
    if old_password == new_password {
        return Err(ApiError::validation("New password must be different"));
    }

    let password_hash = state.auth.hash_password(new_password)?;
    state
        .storage
        .users
        .update(&user.id, |user| {
            user.password_hash = password_hash.clone();
            user.updated_at = Utc::now();
            Ok(())
        })?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(ApiResponse::ok(serde_json::json!({}), "Password changed successfully"))
}

#[utoipa::path(
    patch,
    path = "/api/v1/users/update-profile",
    tag = "users",
    security(("bearer_auth" = [])),
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = UserProfile),
        (status = 409, description = "Email taken"),
    )
)]
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    ApiJson(payload): ApiJson<UpdateProfileRequest>,
) -> Result<ApiResponse<UserProfile>> {
    let user = principal.user()?;
    let full_name = required(&payload.full_name, "").ok();
    let email = required(&payload.email, "").ok();
    if full_name.is_none() && email.is_none() {
        return Err(ApiError::validation("At least one field is required"));
    }

    let updated = state
        .storage
        .update_user_profile(&user.id, full_name, email, Utc::now())?;
    Ok(ApiResponse::ok(UserProfile::from(&updated), "Account details updated successfully"))
}

#[utoipa::path(
    patch,
    path = "/api/v1/users/profile-photo",
    tag = "users",
    security(("bearer_auth" = [])),
    request_body(content = String, content_type = "multipart/form-data", description = "`profilePhoto` file part"),
    responses((status = 200, description = "Photo replaced", body = UserProfile))
)]
pub async fn update_profile_photo(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    multipart: Multipart,
) -> Result<ApiResponse<UserProfile>> {
    let user = principal.user()?;
    let mut form = FormData::read(multipart).await?;
    let file = form
        .take_file("profilePhoto")
        .ok_or_else(|| ApiError::validation("Profile photo file is missing"))?;
    file.expect_kind(MediaKind::Image)?;

    let photo = state
        .media
        .upload(MediaKind::Image, &file.file_name, file.bytes)
        .await?;

    let updated = state.storage.users.update(&user.id, |user| {
        user.profile_photo = Some(photo.clone());
        user.updated_at = Utc::now();
        Ok(())
    })?;
    let Some(updated) = updated else {
        state.discard(MediaKind::Image, &photo).await;
        return Err(ApiError::not_found("User not found"));
    };

    if let Some(previous) = &user.profile_photo {
        state.discard(MediaKind::Image, previous).await;
    }

    Ok(ApiResponse::ok(UserProfile::from(&updated), "Profile photo updated successfully"))
}

#[utoipa::path(
    get,
    path = "/api/v1/users/current-user",
    tag = "users",
    security(("bearer_auth" = [])),
    responses((status = 200, description = "The authenticated principal", body = PrincipalView))
)]
pub async fn current_user(Extension(principal): Extension<Principal>) -> ApiResponse<PrincipalView> {
    ApiResponse::ok(PrincipalView::from(&principal), "Current user fetched successfully")
}

#[utoipa::path(
    get,
    path = "/api/v1/users/c/{username}",
    tag = "users",
    security(("bearer_auth" = [])),
    params(("username" = String, Path, description = "Channel owner")),
    responses(
        (status = 200, description = "Channel profile", body = ChannelProfile),
        (status = 404, description = "No such user"),
    )
)]
pub async fn channel_profile(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
) -> Result<ApiResponse<ChannelProfile>> {
    let user = state
        .storage
        .find_user_by_username(&username)?
        .ok_or_else(|| ApiError::not_found("Channel does not exist"))?;

    let reports = state.storage.reports_by(&user.id)?;

    Ok(ApiResponse::ok(
        ChannelProfile {
            id: user.id,
            full_name: user.full_name,
            username: user.username,
            profile_photo: user.profile_photo,
            points: user.points,
            total_reports: reports.len(),
            reports,
            shorts: user.shorts,
            created_at: user.created_at,
        },
        "User channel fetched successfully",
    ))
}
