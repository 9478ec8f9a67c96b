use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{ApiError, Result};

/// Turns coordinates into a human-readable address.
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// `Ok(None)` when the service has no address for the point.
    async fn reverse(&self, latitude: f64, longitude: f64) -> Result<Option<String>>;
}

/// Google Maps reverse geocoding (`/maps/api/geocode/json?latlng=..`).
pub struct GoogleGeocoder {
    client: Client,
    base_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct GeocodeResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Deserialize)]
struct GeocodeResult {
    formatted_address: Option<String>,
}

impl GoogleGeocoder {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Internal(format!("geocoding client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl Geocoder for GoogleGeocoder {
    async fn reverse(&self, latitude: f64, longitude: f64) -> Result<Option<String>> {
        let url = format!("{}/maps/api/geocode/json", self.base_url);
        let latlng = format!("{latitude},{longitude}");

        let response = self
            .client
            .get(&url)
            .query(&[("latlng", latlng.as_str()), ("key", self.api_key.as_str())])
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| {
                warn!(error = %e, "reverse geocoding request failed");
                ApiError::upstream("Address lookup failed")
            })?;

        let body: GeocodeResponse = response.json().await.map_err(|e| {
            warn!(error = %e, "reverse geocoding returned an unreadable body");
            ApiError::upstream("Address lookup failed")
        })?;

        debug!(status = %body.status, results = body.results.len(), "reverse geocoded");
        Ok(body
            .results
            .into_iter()
            .find_map(|result| result.formatted_address))
    }
}

/// Offline fallback used when no API key is configured: the "address" is
/// the formatted coordinate pair.
pub struct CoordinateGeocoder;

#[async_trait]
impl Geocoder for CoordinateGeocoder {
    async fn reverse(&self, latitude: f64, longitude: f64) -> Result<Option<String>> {
        Ok(Some(format!("{latitude:.5}, {longitude:.5}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn coordinate_fallback_formats_the_point() {
        let address = CoordinateGeocoder.reverse(37.7, -122.4).await.unwrap();
        assert_eq!(address.as_deref(), Some("37.70000, -122.40000"));
    }

    /// Serves canned Google responses on a local port: `0,0` has no
    /// address, anything else resolves unless the key is wrong.
    async fn stub_google() -> String {
        use std::collections::HashMap;

        use axum::extract::Query;
        use axum::routing::get;
        use axum::{Json, Router};
        use serde_json::{json, Value};

        async fn geocode(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
            if params.get("key").map(String::as_str) != Some("test-key") {
                return Json(json!({ "status": "REQUEST_DENIED", "results": [] }));
            }
            match params.get("latlng").map(String::as_str) {
                Some("0,0") => Json(json!({ "status": "ZERO_RESULTS", "results": [] })),
                _ => Json(json!({
                    "status": "OK",
                    "results": [
                        { "place_id": "no-address" },
                        { "formatted_address": "1 Market St, San Francisco" },
                        { "formatted_address": "San Francisco, CA" }
                    ]
                })),
            }
        }

        let app = Router::new().route("/maps/api/geocode/json", get(geocode));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/")
    }

    #[tokio::test]
    async fn google_reverse_returns_first_formatted_address() {
        let base_url = stub_google().await;
        let geocoder = GoogleGeocoder::new(&base_url, "test-key", Duration::from_secs(5)).unwrap();

        let address = geocoder.reverse(37.7, -122.4).await.unwrap();
        assert_eq!(address.as_deref(), Some("1 Market St, San Francisco"));
    }

    #[tokio::test]
    async fn google_zero_results_is_no_address() {
        let base_url = stub_google().await;
        let geocoder = GoogleGeocoder::new(&base_url, "test-key", Duration::from_secs(5)).unwrap();
        assert_eq!(geocoder.reverse(0.0, 0.0).await.unwrap(), None);

        let denied = GoogleGeocoder::new(&base_url, "wrong-key", Duration::from_secs(5)).unwrap();
        assert_eq!(denied.reverse(37.7, -122.4).await.unwrap(), None);
    }

    #[tokio::test]
    async fn unreachable_service_is_an_upstream_error() {
        let geocoder =
            GoogleGeocoder::new("http://127.0.0.1:9", "key", Duration::from_millis(500)).unwrap();
        let err = geocoder.reverse(37.7, -122.4).await.unwrap_err();
        assert!(matches!(err, ApiError::Upstream(_)));
    }
}
