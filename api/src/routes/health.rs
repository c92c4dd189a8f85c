//! Health check endpoint

use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::ApiState;

/// Liveness report
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    /// Always `healthy`
    pub status: String,
    /// Crate version
    pub version: String,
    /// Deployment environment
    pub environment: String,
    /// RFC 3339 server time
    pub timestamp: String,
}

/// Health check; never authorized or rate limited
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    ),
    tag = "health"
)]
pub async fn health_check(State(state): State<Arc<ApiState>>) -> Json<HealthResponse> {
    let environment = if state.pipeline.normalizer().exposes_details() {
        "development"
    } else {
        "production"
    };

    Json(HealthResponse {
        status: "healthy".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        environment: environment.into(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}
