use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use super::dto::{EnqueueResponse, ReprocessFailedResponse, VideoStatusResponse};
use crate::common::response::{ApiError, ApiResponse, ApiSuccess};
use crate::state::AppState;

/// Processing status, progress and produced variants
#[utoipa::path(
    get,
    path = "/api/v1/videos/{id}/status",
    params(
        ("id" = Uuid, Path, description = "Video ID")
    ),
    responses(
        (status = 200, description = "Processing status", body = ApiResponse<VideoStatusResponse>),
        (status = 404, description = "Video not found")
    ),
    tag = "Videos"
)]
pub async fn get_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state.videos.status(id).await {
        Ok(status) => ApiSuccess(
            ApiResponse::success(status, "Status retrieved successfully"),
            StatusCode::OK,
        )
        .into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// Queue a freshly uploaded video for transcoding
#[utoipa::path(
    post,
    path = "/api/v1/videos/{id}/process",
    params(
        ("id" = Uuid, Path, description = "Video ID")
    ),
    responses(
        (status = 202, description = "Job queued", body = ApiResponse<EnqueueResponse>),
        (status = 404, description = "Video not found"),
        (status = 409, description = "Video is not pending"),
        (status = 503, description = "Queue unavailable")
    ),
    tag = "Videos"
)]
pub async fn process_video(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state.videos.enqueue(id).await {
        Ok(resp) => ApiSuccess(
            ApiResponse::success(resp, "Video queued for processing"),
            StatusCode::ACCEPTED,
        )
        .into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// Reset a completed or failed video and run it again
#[utoipa::path(
    post,
    path = "/api/v1/videos/{id}/reprocess",
    params(
        ("id" = Uuid, Path, description = "Video ID")
    ),
    responses(
        (status = 202, description = "Job queued", body = ApiResponse<EnqueueResponse>),
        (status = 404, description = "Video not found"),
        (status = 409, description = "Video is pending or held by a running job"),
        (status = 503, description = "Queue unavailable")
    ),
    tag = "Videos"
)]
pub async fn reprocess_video(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state.videos.reprocess(id).await {
        Ok(resp) => ApiSuccess(
            ApiResponse::success(resp, "Video queued for reprocessing"),
            StatusCode::ACCEPTED,
        )
        .into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// Requeue every failed video whose source is still on disk
#[utoipa::path(
    post,
    path = "/api/v1/admin/reprocess-failed",
    responses(
        (status = 200, description = "Failed videos requeued", body = ApiResponse<ReprocessFailedResponse>)
    ),
    tag = "Admin"
)]
pub async fn reprocess_failed(State(state): State<AppState>) -> impl IntoResponse {
    match state.videos.reprocess_failed().await {
        Ok(resp) => {
            let message = format!("Reprocessing {} failed videos", resp.count);
            ApiSuccess(ApiResponse::success(resp, &message), StatusCode::OK).into_response()
        }
        Err(e) => ApiError::from(e).into_response(),
    }
}
