use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Server configuration. Every flag can also come from the environment
/// (a `.env` file is loaded first by the binary).
#[derive(Debug, Clone, Parser)]
#[command(name = "civic_hub", about = "Civic issue reporting API", long_about = None)]
pub struct Config {
    /// Address the REST API binds to
    #[arg(long, env = "CIVIC_BIND", default_value = "0.0.0.0:11111")]
    pub bind: SocketAddr,

    /// Sled database directory
    #[arg(long, env = "CIVIC_DATA_DIR", default_value = "civic_data")]
    pub data_dir: PathBuf,

    /// Directory uploaded photos and videos are written to
    #[arg(long, env = "CIVIC_MEDIA_DIR", default_value = "civic_media")]
    pub media_dir: PathBuf,

    /// Base URL media links are built from
    #[arg(long, env = "CIVIC_PUBLIC_URL", default_value = "http://localhost:11111")]
    pub public_url: String,

    #[arg(long, env = "ACCESS_TOKEN_SECRET", hide_env_values = true)]
    pub access_token_secret: String,

    #[arg(long, env = "CSR_ACCESS_TOKEN_SECRET", hide_env_values = true)]
    pub csr_token_secret: String,

    /// Token lifetime in seconds
    #[arg(long, env = "ACCESS_TOKEN_EXPIRY_SECS", default_value_t = 86_400)]
    pub token_expiry_secs: u64,

    #[arg(long, env = "BCRYPT_COST", default_value_t = bcrypt::DEFAULT_COST)]
    pub bcrypt_cost: u32,

    /// Google Maps key for reverse geocoding; without it addresses are the raw coordinates
    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    pub google_api_key: Option<String>,

    #[arg(long, env = "GEOCODE_BASE_URL", default_value = "https://maps.googleapis.com")]
    pub geocode_base_url: String,

    #[arg(long, env = "GEOCODE_TIMEOUT_SECS", default_value_t = 10)]
    pub geocode_timeout_secs: u64,

    /// Upper bound for multipart upload bodies
    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value_t = 64 * 1024 * 1024)]
    pub max_upload_bytes: usize,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Also write daily-rotated logs here
    #[arg(long, env = "LOG_DIR")]
    pub log_dir: Option<PathBuf>,
}

impl Config {
    pub fn geocode_timeout(&self) -> Duration {
        Duration::from_secs(self.geocode_timeout_secs)
    }
}
