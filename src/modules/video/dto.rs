use serde::Serialize;
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;

use super::model::{ProcessingStatus, ResolutionVariant, VideoJob};

#[derive(Debug, Serialize, ToSchema)]
pub struct VariantResponse {
    pub resolution: String,
    pub file_size: u64,
    pub bitrate: u64,
    pub width: u32,
    pub height: u32,
    pub stream_url: String,
    pub download_url: String,
}

impl VariantResponse {
    pub fn new(video_id: Uuid, v: ResolutionVariant) -> Self {
        Self {
            stream_url: format!("/api/videos/{}/stream/{}", video_id, v.resolution),
            download_url: format!("/api/videos/{}/download/{}", video_id, v.resolution),
            resolution: v.resolution,
            file_size: v.file_size,
            bitrate: v.bitrate,
            width: v.width,
            height: v.height,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VideoStatusResponse {
    pub id: Uuid,
    pub original_filename: String,
    pub processing_status: ProcessingStatus,
    pub processing_progress: u8,
    pub error_message: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<f64>,
    pub bitrate: Option<u64>,
    pub codec: Option<String>,
    pub duration: Option<f64>,
    pub thumbnail_url: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String, format = DateTime)]
    pub uploaded_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    #[schema(value_type = Option<String>, format = DateTime)]
    pub processed_at: Option<OffsetDateTime>,
    pub resolutions: Vec<VariantResponse>,
}

impl VideoStatusResponse {
    pub fn new(video: VideoJob, variants: Vec<ResolutionVariant>) -> Self {
        let id = video.id;
        Self {
            id,
            original_filename: video.original_filename,
            processing_status: video.processing_status,
            processing_progress: video.processing_progress,
            error_message: video.error_message,
            width: video.width,
            height: video.height,
            fps: video.fps,
            bitrate: video.bitrate,
            codec: video.codec,
            duration: video.duration,
            thumbnail_url: video
                .thumbnail_path
                .map(|_| format!("/api/videos/{}/thumbnail", id)),
            uploaded_at: video.uploaded_at,
            processed_at: video.processed_at,
            resolutions: variants
                .into_iter()
                .map(|v| VariantResponse::new(id, v))
                .collect(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EnqueueResponse {
    pub video_id: Uuid,
    pub processing_status: ProcessingStatus,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReprocessFailedResponse {
    pub count: usize,
    pub video_ids: Vec<Uuid>,
}
