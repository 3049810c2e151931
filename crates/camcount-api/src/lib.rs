//! Axum HTTP API server.
//!
//! This crate provides:
//! - `GET /get?id=<group>` running the download and detection pipeline
//! - Static serving of processed clips and manifests under `/videos`
//! - Startup provisioning and the optional auto-refresh loop
//! - Prometheus metrics

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod refresh;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use refresh::AutoRefresh;
pub use routes::create_router;
pub use state::AppState;
