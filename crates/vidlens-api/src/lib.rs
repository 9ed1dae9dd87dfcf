//! Axum HTTP API for video analysis jobs.
//!
//! This crate provides:
//! - The job gateway (submit, status, cancel, list)
//! - REST routes under `/api/v1`
//! - Per-IP rate limiting and security headers
//! - Prometheus metrics

pub mod config;
pub mod dto;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use gateway::{GatewayError, GatewayResult, JobGateway};
pub use routes::create_router;
pub use state::AppState;
