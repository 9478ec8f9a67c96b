use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use super::AppState;
use crate::error::ApiError;

pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";

/// Token from the `accessToken` cookie, else from `Authorization: Bearer`.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    let from_cookie = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == ACCESS_TOKEN_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string());

    from_cookie.or_else(|| {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_string)
    })
}

/// Resolves the caller and stores it as an `Extension<Principal>`.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_token(req.headers())
        .ok_or_else(|| ApiError::unauthorized("Unauthorized request"))?;

    let principal = state.auth.resolve(&state.storage, &token)?;
    debug!(kind = ?principal.kind(), id = principal.id(), "authenticated");

    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}

/// `Set-Cookie` value carrying a fresh token.
pub fn session_cookie(token: &str, max_age_secs: u64) -> String {
    format!("{ACCESS_TOKEN_COOKIE}={token}; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age={max_age_secs}")
}

/// `Set-Cookie` value that expires the session cookie.
pub fn cleared_cookie() -> String {
    format!("{ACCESS_TOKEN_COOKIE}=; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age=0")
}
