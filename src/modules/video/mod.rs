use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

pub mod dto;
pub mod events;
pub mod handler;
#[cfg(test)]
pub mod memory;
pub mod model;
pub mod repository;
pub mod service;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{id}/status", get(handler::get_status))
        .route("/{id}/process", post(handler::process_video))
        .route("/{id}/reprocess", post(handler::reprocess_video))
}

pub fn admin_router() -> Router<AppState> {
    Router::new().route("/reprocess-failed", post(handler::reprocess_failed))
}
