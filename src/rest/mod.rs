//! REST API layer (Axum), mounted under `/api/v1`.
//!
//! Each resource has its own router; protected routes share the auth
//! middleware through `route_layer`, multipart routes get the configured
//! upload limit. Every response uses the `{statusCode, data|message, success}`
//! envelope.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        Method,
    },
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::warn;
use utoipa::OpenApi;

use crate::auth::Auth;
use crate::geocode::Geocoder;
use crate::media::{MediaKind, MediaStore};
use crate::models::StoredMedia;
use crate::storage::Storage;

pub mod authority;
pub mod blog;
pub mod csr;
pub mod docs;
pub mod leaderboard;
pub mod middleware;
pub mod multipart;
pub mod reports;
pub mod response;
pub mod shorts;
pub mod users;

use response::ApiResponse;

/// Shared state for every handler.
pub struct AppState {
    pub storage: Storage,
    pub auth: Auth,
    pub media: Arc<dyn MediaStore>,
    pub geocoder: Arc<dyn Geocoder>,
    pub max_upload_bytes: usize,
    /// Served at `/media` when set.
    pub media_dir: Option<PathBuf>,
}

impl AppState {
    pub fn upload_limit(&self) -> DefaultBodyLimit {
        DefaultBodyLimit::max(self.max_upload_bytes)
    }

    /// Best-effort removal of a stored file that is no longer referenced.
    pub async fn discard(&self, kind: MediaKind, media: &StoredMedia) {
        if let Err(e) = self.media.destroy(kind, &media.public_id).await {
            warn!(error = %e, public_id = %media.public_id, "failed to discard media");
        }
    }
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> ApiResponse<Health> {
    ApiResponse::ok(
        Health {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
        },
        "civic_hub API healthy",
    )
}

async fn openapi_handler() -> Json<utoipa::openapi::OpenApi> {
    Json(docs::ApiDoc::openapi())
}

/// Create the Axum router for the whole API
pub fn create_router(state: AppState) -> Router {
    let state = Arc::new(state);

    let api = Router::new()
        .nest("/users", users::router(state.clone()))
        .nest("/report", reports::router(state.clone()))
        .nest("/authority", authority::router(state.clone()))
        .nest("/csr", csr::router(state.clone()))
        .nest("/leaderboard", leaderboard::router())
        .nest("/shorts", shorts::router(state.clone()))
        .nest("/blog", blog::router());

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60));

    let mut router = Router::new()
        .route("/health", get(health_handler))
        .route("/api-docs/openapi.json", get(openapi_handler))
        .nest("/api/v1", api);

    if let Some(dir) = &state.media_dir {
        router = router.nest_service("/media", ServeDir::new(dir));
    }

    router
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt; // For .oneshot() testing

    use crate::error::{ApiError, Result};

    /// Keeps uploads in memory so tests can see what was stored and destroyed.
    #[derive(Default)]
    struct MemoryMedia {
        files: Mutex<HashMap<String, usize>>,
        fail_uploads: bool,
    }

    impl MemoryMedia {
        fn count(&self) -> usize {
            self.files.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl MediaStore for MemoryMedia {
        async fn upload(&self, kind: MediaKind, file_name: &str, bytes: Vec<u8>) -> Result<StoredMedia> {
            if self.fail_uploads {
                return Err(ApiError::upstream("Media couldn't be uploaded"));
            }
            let public_id = format!("{kind:?}/{}-{file_name}", uuid::Uuid::new_v4());
            self.files.lock().unwrap().insert(public_id.clone(), bytes.len());
            Ok(StoredMedia {
                url: format!("http://media.test/{public_id}"),
                public_id,
            })
        }

        async fn destroy(&self, _kind: MediaKind, public_id: &str) -> Result<()> {
            self.files.lock().unwrap().remove(public_id);
            Ok(())
        }
    }

    struct FixedGeocoder(Option<&'static str>);

    #[async_trait]
    impl Geocoder for FixedGeocoder {
        async fn reverse(&self, _latitude: f64, _longitude: f64) -> Result<Option<String>> {
            Ok(self.0.map(str::to_string))
        }
    }

    struct Harness {
        app: Router,
        storage: Storage,
        media: Arc<MemoryMedia>,
    }

    fn harness_with(geocoder: FixedGeocoder, media: MemoryMedia) -> Harness {
        let storage = Storage::temporary().expect("temporary storage");
        let media = Arc::new(media);
        let app = create_router(AppState {
            storage: storage.clone(),
            auth: Auth::new("access-secret", "csr-secret", 3600, 4),
            media: media.clone(),
            geocoder: Arc::new(geocoder),
            max_upload_bytes: 1024 * 1024,
            media_dir: None,
        });
        Harness { app, storage, media }
    }

    fn harness() -> Harness {
        harness_with(
            FixedGeocoder(Some("1 Market St, San Francisco")),
            MemoryMedia::default(),
        )
    }

    async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.expect("request");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn empty_request(method: &str, uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    const BOUNDARY: &str = "civic-test-boundary";

    /// `file` is `(field, file name, content type)`.
    fn multipart_request(
        uri: &str,
        token: Option<&str>,
        fields: &[(&str, &str)],
        file: Option<(&str, &str, &str)>,
    ) -> Request<Body> {
        let mut body = String::new();
        for (name, value) in fields {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            ));
        }
        if let Some((name, file_name, content_type)) = file {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\nnot-really-a-jpeg\r\n"
            ));
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));

        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            );
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(body)).unwrap()
    }

    /// Registers and logs in a citizen, returning `(user id, token)`.
    async fn citizen(app: &Router, username: &str) -> (String, String) {
        let email = format!("{username}@example.com");
        let (status, body) = call(
            app,
            multipart_request(
                "/api/v1/users/register",
                None,
                &[
                    ("fullName", "Test Citizen"),
                    ("username", username),
                    ("email", &email),
                    ("password", "hunter22"),
                ],
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");

        let (status, body) = call(
            app,
            json_request(
                "POST",
                "/api/v1/users/login",
                None,
                json!({"username": username, "password": "hunter22"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        (
            body["data"]["user"]["id"].as_str().unwrap().to_string(),
            body["data"]["accessToken"].as_str().unwrap().to_string(),
        )
    }

    async fn authority(app: &Router) -> String {
        let (status, body) = call(
            app,
            json_request(
                "POST",
                "/api/v1/authority/register",
                None,
                json!({
                    "name": "Roads Dept",
                    "email": "roads@city.gov",
                    "password": "asphalt!",
                    "designation": "Inspector",
                    "category": "Pothole",
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["data"]["accessToken"].as_str().unwrap().to_string()
    }

    async fn sponsor(app: &Router, name: &str, donations: f64) -> (String, String) {
        let (status, body) = call(
            app,
            json_request(
                "POST",
                "/api/v1/csr/register",
                None,
                json!({
                    "companyName": name,
                    "companyEmail": format!("csr@{}.example", name.to_lowercase()),
                    "companyDescription": "Community fund",
                    "password": "sponsor!",
                    "donations": donations,
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        (
            body["data"]["csr"]["id"].as_str().unwrap().to_string(),
            body["data"]["accessToken"].as_str().unwrap().to_string(),
        )
    }

    async fn submit_pothole(app: &Router, token: &str) -> (StatusCode, Value) {
        call(
            app,
            multipart_request(
                "/api/v1/report/submitReport",
                Some(token),
                &[
                    ("description", "Pothole"),
                    ("department", "Roads"),
                    ("category", "Pothole"),
                    ("latitude", "37.7"),
                    ("longitude", "-122.4"),
                ],
                Some(("image", "pothole.jpg", "image/jpeg")),
            ),
        )
        .await
    }

    #[tokio::test]
    async fn test_health_and_openapi() {
        let h = harness();

        let (status, body) = call(&h.app, empty_request("GET", "/health", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "ok");
        assert_eq!(body["success"], true);

        let (status, body) = call(&h.app, empty_request("GET", "/api-docs/openapi.json", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["paths"]["/api/v1/report/submitReport"].is_object());
        assert!(body["components"]["securitySchemes"]["bearer_auth"].is_object());
    }

    #[tokio::test]
    async fn test_report_lifecycle_through_tender_acceptance() {
        let h = harness();
        let (user_id, user_token) = citizen(&h.app, "alice").await;

        let (status, body) = submit_pothole(&h.app, &user_token).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        let report_id = body["data"]["id"].as_str().unwrap().to_string();
        assert_eq!(body["data"]["address"], "1 Market St, San Francisco");
        assert_eq!(body["data"]["location"]["coordinates"], json!([-122.4, 37.7]));
        assert_eq!(body["data"]["photos"].as_array().unwrap().len(), 1);
        assert_eq!(body["data"]["reportedBy"], user_id.as_str());
        assert_eq!(h.media.count(), 1);

        let authority_token = authority(&h.app).await;
        let (status, body) = call(
            &h.app,
            empty_request("GET", "/api/v1/authority/issues", Some(&authority_token)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"][0]["report"]["id"], report_id.as_str());
        assert_eq!(body["data"][0]["reporter"]["username"], "alice");

        // Resolution awards 5 points exactly once.
        let resolve_uri = format!("/api/v1/authority/issues/{report_id}/resolve");
        let (status, body) = call(&h.app, empty_request("PATCH", &resolve_uri, Some(&authority_token))).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["data"]["status"], "resolved");
        assert!(body["data"]["resolvedAt"].is_string());

        let (status, _) = call(&h.app, empty_request("PATCH", &resolve_uri, Some(&authority_token))).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = call(
            &h.app,
            empty_request("GET", "/api/v1/users/current-user", Some(&user_token)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["kind"], "user");
        assert_eq!(body["data"]["profile"]["points"], 5);

        let (status, body) = call(
            &h.app,
            json_request(
                "POST",
                &format!("/api/v1/authority/issues/{report_id}/release-tender"),
                Some(&authority_token),
                json!({"tenderDetails": "Resurface 20m of Market St"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert!(body["data"]["tender"]["acceptedBy"].is_null());

        let (acme_id, acme_token) = sponsor(&h.app, "Acme", 1000.0).await;
        let (_, beta_token) = sponsor(&h.app, "Beta", 500.0).await;

        let (status, body) = call(&h.app, empty_request("GET", "/api/v1/csr/tenders", Some(&acme_token))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 1);

        let accept_uri = format!("/api/v1/csr/tenders/{report_id}/accept");
        let (status, body) = call(&h.app, empty_request("POST", &accept_uri, Some(&acme_token))).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["data"]["tender"]["acceptedBy"], acme_id.as_str());

        let (status, body) = call(&h.app, empty_request("POST", &accept_uri, Some(&beta_token))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["message"], "Tender already accepted");
        assert_eq!(body["success"], false);

        let stored = h.storage.reports.get(&report_id).unwrap().unwrap();
        assert_eq!(stored.tender.unwrap().accepted_by.as_deref(), Some(acme_id.as_str()));

        let (status, body) = call(&h.app, empty_request("GET", "/api/v1/csr/tenders", Some(&beta_token))).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["data"].as_array().unwrap().is_empty());

        // Acme: 0.6 * 1000 + 100 * 1 = 700, Beta: 0.6 * 500 = 300
        let (status, body) = call(&h.app, empty_request("GET", "/api/v1/leaderboard/csr", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"][0]["companyName"], "Acme");
        assert_eq!(body["data"][0]["problemsSponsored"], 1);
        assert!((body["data"][0]["csrScore"].as_f64().unwrap() - 700.0).abs() < 1e-9);
        assert_eq!(body["data"][1]["companyName"], "Beta");

        let (status, body) = call(&h.app, empty_request("GET", "/api/v1/leaderboard/citizens", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["total"], 1);
        assert_eq!(body["data"]["rows"][0]["username"], "alice");
        assert_eq!(body["data"]["rows"][0]["points"], 5);
        assert_eq!(body["data"]["rows"][0]["totalReports"], 1);
    }

    #[tokio::test]
    async fn test_auth_failures_use_the_envelope() {
        let h = harness();

        let (status, body) = call(&h.app, empty_request("GET", "/api/v1/report/mine", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["statusCode"], 401);
        assert_eq!(body["success"], false);

        let (status, _) = call(&h.app, empty_request("GET", "/api/v1/report/mine", Some("garbage"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        // A citizen cannot resolve, a citizen cannot accept tenders.
        let (_, token) = citizen(&h.app, "bob").await;
        let (_, report) = submit_pothole(&h.app, &token).await;
        let report_id = report["data"]["id"].as_str().unwrap();

        let uri = format!("/api/v1/authority/issues/{report_id}/resolve");
        let (status, _) = call(&h.app, empty_request("PATCH", &uri, Some(&token))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let uri = format!("/api/v1/csr/tenders/{report_id}/accept");
        let (status, _) = call(&h.app, empty_request("POST", &uri, Some(&token))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_cookie_token_and_logout() {
        let h = harness();
        let (_, token) = citizen(&h.app, "carol").await;

        let request = Request::builder()
            .method("GET")
            .uri("/api/v1/users/current-user")
            .header(header::COOKIE, format!("accessToken={token}"))
            .body(Body::empty())
            .unwrap();
        let (status, body) = call(&h.app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["profile"]["username"], "carol");

        let response = h
            .app
            .clone()
            .oneshot(empty_request("POST", "/api/v1/users/logout", Some(&token)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with("accessToken=;"));
        assert!(cookie.contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn test_duplicate_registration_conflicts() {
        let h = harness();
        citizen(&h.app, "dana").await;

        let (status, body) = call(
            &h.app,
            multipart_request(
                "/api/v1/users/register",
                None,
                &[
                    ("fullName", "Other Dana"),
                    ("username", "DANA"),
                    ("email", "other@example.com"),
                    ("password", "pw"),
                ],
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT, "{body}");

        let (status, body) = call(
            &h.app,
            json_request(
                "POST",
                "/api/v1/users/login",
                None,
                json!({"email": "dana@example.com", "password": "wrong"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{body}");
    }

    #[tokio::test]
    async fn test_submit_rejections_leave_nothing_behind() {
        let h = harness_with(FixedGeocoder(None), MemoryMedia::default());
        let (_, token) = citizen(&h.app, "erin").await;

        let (status, body) = submit_pothole(&h.app, &token).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY, "{body}");
        assert!(h.storage.reports.is_empty());
        assert_eq!(h.media.count(), 0);

        let (status, body) = call(
            &h.app,
            multipart_request(
                "/api/v1/report/submitReport",
                Some(&token),
                &[
                    ("description", "Pothole"),
                    ("department", "Roads"),
                    ("category", "Pothole"),
                    ("latitude", "91"),
                    ("longitude", "-122.4"),
                ],
                Some(("image", "pothole.jpg", "image/jpeg")),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "latitude must be between -90 and 90");

        let (status, body) = call(
            &h.app,
            multipart_request(
                "/api/v1/report/submitReport",
                Some(&token),
                &[
                    ("description", "Pothole"),
                    ("department", "Roads"),
                    ("category", "Pothole"),
                    ("latitude", "37.7"),
                    ("longitude", "-122.4"),
                ],
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Image is required");
        assert!(h.storage.reports.is_empty());
    }

    #[tokio::test]
    async fn test_failed_upload_is_upstream_error() {
        let h = harness_with(
            FixedGeocoder(Some("Main St")),
            MemoryMedia {
                fail_uploads: true,
                ..Default::default()
            },
        );
        let (_, token) = citizen(&h.app, "fay").await;

        let (status, _) = submit_pothole(&h.app, &token).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(h.storage.reports.is_empty());
    }

    #[tokio::test]
    async fn test_description_edit_and_delete() {
        let h = harness();
        let (_, owner) = citizen(&h.app, "gail").await;
        let (_, stranger) = citizen(&h.app, "hank").await;
        let (_, report) = submit_pothole(&h.app, &owner).await;
        let report_id = report["data"]["id"].as_str().unwrap().to_string();
        let uri = format!("/api/v1/report/updateDescription/{report_id}");

        let (status, body) = call(
            &h.app,
            json_request("PATCH", &uri, Some(&owner), json!({"oldDescription": "Crack", "newDescription": "Deep pothole"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

        let (status, _) = call(
            &h.app,
            json_request("PATCH", &uri, Some(&stranger), json!({"oldDescription": "Pothole", "newDescription": "Deep pothole"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = call(
            &h.app,
            json_request("PATCH", &uri, Some(&owner), json!({"oldDescription": "Pothole", "newDescription": "Deep pothole"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["data"]["description"], "Deep pothole");

        let (status, body) = call(&h.app, empty_request("GET", &format!("/api/v1/report/{report_id}"), Some(&stranger))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["description"], "Deep pothole");

        let delete_uri = format!("/api/v1/report/deleteReport/{report_id}");
        let (status, _) = call(&h.app, empty_request("DELETE", &delete_uri, Some(&stranger))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(h.media.count(), 1);

        let (status, _) = call(&h.app, empty_request("DELETE", &delete_uri, Some(&owner))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(h.media.count(), 0);
        assert!(h.storage.reports.get(&report_id).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_feed_nearby_and_channel() {
        let h = harness();
        let (_, token) = citizen(&h.app, "ivan").await;
        submit_pothole(&h.app, &token).await;
        submit_pothole(&h.app, &token).await;

        let (status, body) = call(&h.app, empty_request("GET", "/api/v1/report/feed?limit=1", Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["total"], 2);
        assert_eq!(body["data"]["hasMore"], true);
        assert_eq!(body["data"]["reports"].as_array().unwrap().len(), 1);

        let (status, body) = call(
            &h.app,
            empty_request("GET", "/api/v1/report/nearby?lat=37.71&lng=-122.4&radiusKm=5", Some(&token)),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["data"].as_array().unwrap().len(), 2);
        assert!(body["data"][0]["distanceKm"].as_f64().unwrap() < 2.0);

        let (status, body) = call(
            &h.app,
            empty_request("GET", "/api/v1/report/nearby?lat=40.7&lng=-74.0", Some(&token)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["data"].as_array().unwrap().is_empty());

        let (status, body) = call(&h.app, empty_request("GET", "/api/v1/users/c/ivan", Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["totalReports"], 2);
        assert!(body["data"].get("email").is_none());

        let (status, _) = call(&h.app, empty_request("GET", "/api/v1/users/c/nobody", Some(&token))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_pages_far_past_the_end_are_empty() {
        let h = harness();
        let (_, token) = citizen(&h.app, "judy").await;
        submit_pothole(&h.app, &token).await;

        let huge = usize::MAX;
        let (status, body) = call(
            &h.app,
            empty_request("GET", &format!("/api/v1/report/feed?page={huge}&limit=50"), Some(&token)),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["data"]["hasMore"], false);
        assert!(body["data"]["reports"].as_array().unwrap().is_empty());

        let (status, body) = call(&h.app, empty_request("GET", &format!("/api/v1/shorts?page={huge}"), Some(&token))).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert!(body["data"]["shorts"].as_array().unwrap().is_empty());

        let (status, body) = call(
            &h.app,
            empty_request("GET", &format!("/api/v1/leaderboard/citizens/list?offset={huge}"), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["data"]["total"], 1);
        assert!(body["data"]["rows"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_shorts_votes_and_delete() {
        let h = harness();
        let (_, poster) = citizen(&h.app, "jane").await;
        let (_, viewer) = citizen(&h.app, "kyle").await;

        let (status, body) = call(
            &h.app,
            multipart_request(
                "/api/v1/shorts",
                Some(&poster),
                &[("title", "Flooded underpass"), ("description", "Water up to the kerb")],
                Some(("video", "flood.mp4", "video/mp4")),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        let shorts_id = body["data"]["id"].as_str().unwrap().to_string();

        let upvote = format!("/api/v1/shorts/{shorts_id}/upvote");
        let downvote = format!("/api/v1/shorts/{shorts_id}/downvote");

        let (_, body) = call(&h.app, empty_request("POST", &upvote, Some(&viewer))).await;
        assert_eq!((body["data"]["upvotes"].clone(), body["data"]["downvotes"].clone()), (json!(1), json!(0)));

        let (_, body) = call(&h.app, empty_request("POST", &downvote, Some(&viewer))).await;
        assert_eq!((body["data"]["upvotes"].clone(), body["data"]["downvotes"].clone()), (json!(0), json!(1)));

        let (_, body) = call(&h.app, empty_request("POST", &downvote, Some(&viewer))).await;
        assert_eq!(body["data"]["downvotes"], 0);

        let (status, body) = call(&h.app, empty_request("POST", &format!("/api/v1/shorts/{shorts_id}/share"), Some(&viewer))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["shares"], 1);

        let (status, body) = call(&h.app, empty_request("GET", "/api/v1/shorts", Some(&viewer))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["total"], 1);
        assert_eq!(body["data"]["hasMore"], false);

        let (status, _) = call(&h.app, empty_request("POST", "/api/v1/shorts/missing/upvote", Some(&viewer))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let delete_uri = format!("/api/v1/shorts/{shorts_id}");
        let (status, _) = call(&h.app, empty_request("DELETE", &delete_uri, Some(&viewer))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = call(&h.app, empty_request("DELETE", &delete_uri, Some(&poster))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(h.media.count(), 0);
        let owner = h.storage.find_user_by_username("jane").unwrap().unwrap();
        assert!(owner.shorts.is_empty());
    }

    #[tokio::test]
    async fn test_stale_reports_empty_is_not_found() {
        let h = harness();
        let (status, body) = call(&h.app, empty_request("GET", "/api/v1/blog/stale-reports", None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
    }
}
