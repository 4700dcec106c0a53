//! Progress Reporter: the only writer of a video's status during a run.

use tracing::debug;
use uuid::Uuid;

use crate::modules::video::model::{ProcessingStatus, StatusUpdate};
use crate::modules::video::repository::{PersistenceError, VideoRepository};

pub const METADATA_DONE: u8 = 20;
pub const THUMBNAIL_DONE: u8 = 30;
pub const COMPLETE: u8 = 100;

const LADDER_SPAN: usize = 60;

/// Progress after rung `index` (0-based) of `rung_count` has been handled,
/// whether it was encoded, skipped or failed.
pub fn ladder_progress(index: usize, rung_count: usize) -> u8 {
    if rung_count == 0 {
        return THUMBNAIL_DONE + LADDER_SPAN as u8;
    }
    let done = (index + 1).min(rung_count);
    THUMBNAIL_DONE + (LADDER_SPAN * done / rung_count) as u8
}

/// Writes go straight through; progress never moves backwards within a run.
pub struct ProgressReporter<'a, R: VideoRepository + ?Sized> {
    repo: &'a R,
    video_id: Uuid,
    current: u8,
}

impl<'a, R: VideoRepository + ?Sized> ProgressReporter<'a, R> {
    pub fn new(repo: &'a R, video_id: Uuid) -> Self {
        Self {
            repo,
            video_id,
            current: 0,
        }
    }

    pub fn current(&self) -> u8 {
        self.current
    }

    pub async fn start(&mut self) -> Result<(), PersistenceError> {
        self.current = 0;
        self.write(ProcessingStatus::Processing, 0, None).await
    }

    pub async fn advance(&mut self, progress: u8) -> Result<(), PersistenceError> {
        let progress = progress.min(COMPLETE).max(self.current);
        self.write(ProcessingStatus::Processing, progress, None).await
    }

    pub async fn complete(&mut self) -> Result<(), PersistenceError> {
        self.write(ProcessingStatus::Completed, COMPLETE, None).await
    }

    pub async fn fail(&mut self, message: &str, progress: u8) -> Result<(), PersistenceError> {
        let progress = progress.min(COMPLETE).max(self.current);
        self.write(ProcessingStatus::Failed, progress, Some(message.to_string()))
            .await
    }

    async fn write(
        &mut self,
        status: ProcessingStatus,
        progress: u8,
        error_message: Option<String>,
    ) -> Result<(), PersistenceError> {
        let update = StatusUpdate {
            status,
            progress,
            error_message,
        };
        self.repo.record_status(self.video_id, &update).await?;
        self.current = progress;

        debug!(video_id = %self.video_id, %status, progress, "Status recorded");
        Ok(())
    }
}
