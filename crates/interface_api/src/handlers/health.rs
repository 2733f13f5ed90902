//! Health check handlers

use axum::{extract::State, http::StatusCode, Json};
use core_kernel::AdapterHealth;
use serde::Serialize;
use tracing::warn;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        latency_ms: None,
    })
}

/// Readiness check (includes the billing store)
pub async fn readiness_check(
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, StatusCode> {
    let result = state.readiness.health_check().await;

    match result.status {
        AdapterHealth::Healthy | AdapterHealth::Degraded => Ok(Json(HealthResponse {
            status: "ready".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            latency_ms: Some(result.latency_ms),
        })),
        AdapterHealth::Unhealthy | AdapterHealth::Unknown => {
            warn!(adapter = %result.adapter_id, message = ?result.message, "store not ready");
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}
