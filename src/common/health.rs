use axum::{extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use utoipa::ToSchema;

use crate::common::response::{ApiResponse, ApiSuccess};
use crate::infrastructure::db::pool;
use crate::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub database: bool,
    pub redis: bool,
    pub queue: bool,
}

impl HealthResponse {
    pub fn healthy(&self) -> bool {
        self.database && self.redis && self.queue
    }
}

/// Dependency reachability
#[utoipa::path(
    get,
    path = "/api/v1/health",
    responses(
        (status = 200, description = "All dependencies reachable", body = ApiResponse<HealthResponse>),
        (status = 503, description = "At least one dependency is down", body = ApiResponse<HealthResponse>)
    ),
    tag = "Health"
)]
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let report = HealthResponse {
        database: pool::ping(&state.db).await.is_ok(),
        redis: state.redis.ping().await.is_ok(),
        queue: state.queue.is_connected().await,
    };

    if report.healthy() {
        ApiSuccess(ApiResponse::success(report, "ok"), StatusCode::OK)
    } else {
        ApiSuccess(ApiResponse::success(report, "degraded"), StatusCode::SERVICE_UNAVAILABLE)
    }
}
