use utoipa::OpenApi;

use crate::common::health::HealthResponse;
use crate::modules::video::dto::{
    EnqueueResponse, ReprocessFailedResponse, VariantResponse, VideoStatusResponse,
};
use crate::modules::video::model::ProcessingStatus;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::common::health::health,
        crate::modules::video::handler::get_status,
        crate::modules::video::handler::process_video,
        crate::modules::video::handler::reprocess_video,
        crate::modules::video::handler::reprocess_failed,
    ),
    components(
        schemas(
            HealthResponse,
            ProcessingStatus,
            VideoStatusResponse,
            VariantResponse,
            EnqueueResponse,
            ReprocessFailedResponse,
        )
    ),
    tags(
        (name = "Videos", description = "Transcoding status and triggers"),
        (name = "Admin", description = "Bulk maintenance"),
        (name = "Health", description = "Service health")
    )
)]
pub struct ApiDoc;
