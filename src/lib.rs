//! civic_hub: civic issue reporting backend in Rust
//!
//! Citizens report geotagged issues with photos, authorities triage and
//! resolve them, CSR sponsors pick up tenders. Documents live in Sled (JSON
//! per key), leaderboards are SQL over Arrow projections (DataFusion), and
//! the whole thing is served as a REST API with Axum.

pub mod auth;
pub mod config;
pub mod error;
pub mod geocode;
pub mod media;
pub mod models;
// Leaderboard read-models: DataFusion SQL over Arrow projections of the Sled trees
pub mod query;
// REST API: Axum handlers under /api/v1
pub mod rest;
pub mod storage;
pub mod telemetry;
pub mod workflow;
