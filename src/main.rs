//! civic_hub server
//!
//! Serves the REST API over the Sled document store.
//!
//! Usage:
//!   cargo run --bin load_data     # seed demo data
//!   cargo run --bin civic_hub     # start server (flags or .env, see --help)
//!   cargo run --bin civic-cli -- --help

use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

use civic_hub::auth::Auth;
use civic_hub::config::Config;
use civic_hub::geocode::{CoordinateGeocoder, Geocoder, GoogleGeocoder};
use civic_hub::media::LocalMediaStore;
use civic_hub::rest::{create_router, AppState};
use civic_hub::storage::Storage;
use civic_hub::telemetry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    let config = Config::parse();
    let _log_guard = telemetry::init(config.log_format, config.log_dir.as_deref());

    info!(data_dir = %config.data_dir.display(), "opening storage");
    let storage = Storage::open(&config.data_dir)?;

    tokio::fs::create_dir_all(&config.media_dir).await?;
    let media = LocalMediaStore::new(config.media_dir.clone(), &config.public_url);

    let geocoder: Arc<dyn Geocoder> = match config.google_api_key.as_deref() {
        Some(key) if !key.trim().is_empty() => Arc::new(GoogleGeocoder::new(
            &config.geocode_base_url,
            key,
            config.geocode_timeout(),
        )?),
        _ => {
            warn!("GOOGLE_API_KEY not set, report addresses fall back to coordinates");
            Arc::new(CoordinateGeocoder)
        }
    };

    let app = create_router(AppState {
        storage: storage.clone(),
        auth: Auth::new(
            &config.access_token_secret,
            &config.csr_token_secret,
            config.token_expiry_secs,
            config.bcrypt_cost,
        ),
        media: Arc::new(media),
        geocoder,
        max_upload_bytes: config.max_upload_bytes,
        media_dir: Some(config.media_dir.clone()),
    });

    let listener = TcpListener::bind(config.bind).await?;
    info!(
        addr = %config.bind,
        users = storage.users.len(),
        reports = storage.reports.len(),
        "civic_hub REST API listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let flushed = storage.flush().await?;
    info!(bytes = flushed, "storage flushed, bye");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("received Ctrl+C, shutting down"),
            Err(e) => {
                error!(error = %e, "failed to install Ctrl+C handler");
                std::future::pending::<()>().await
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("received terminate signal, shutting down");
            }
            Err(e) => {
                error!(error = %e, "failed to install terminate handler");
                std::future::pending::<()>().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
