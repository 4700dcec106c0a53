use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::infrastructure::queue::QueueError;

/// Body of a message on the transcode queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscodeJob {
    pub video_id: Uuid,
}

impl TranscodeJob {
    pub fn new(video_id: Uuid) -> Self {
        Self { video_id }
    }
}

/// Hands transcode jobs to the worker pool.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobPublisher: Send + Sync {
    async fn publish(&self, job: TranscodeJob) -> Result<(), QueueError>;
}
